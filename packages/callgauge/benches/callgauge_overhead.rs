//! Benchmarks to measure the overhead that instrumentation and profiling add to a call.
//!
//! Every benchmark enters and leaves one empty frame; they differ only in what is
//! observing the instrumentation at the time.

#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::time::Duration;

use callgauge::{
    CooperativeClock, GlobalClock, Instrumentation, Profiler, SamplingProfiler, ThreadClock,
    TracingProfiler, location,
};
use criterion::{Criterion, criterion_group, criterion_main};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("callgauge_overhead");

    group.bench_function("baseline_empty", |b| {
        b.iter(|| {
            black_box(());
        });
    });

    let instrumentation = Instrumentation::new();
    let frame = location!("empty_frame");

    group.bench_function("unobserved_frame", |b| {
        b.iter(|| {
            let _frame = instrumentation.enter(frame);
            black_box(());
        });
    });

    {
        let mut profiler = SamplingProfiler::builder(&instrumentation)
            .interval(Duration::from_millis(1))
            .build();
        let _active = profiler.activate().unwrap();

        group.bench_function("sampled_frame", |b| {
            b.iter(|| {
                let _frame = instrumentation.enter(frame);
                black_box(());
            });
        });
    }

    {
        let mut profiler = TracingProfiler::builder(&instrumentation)
            .clock(GlobalClock::new())
            .build();
        let _active = profiler.activate().unwrap();

        group.bench_function("traced_frame_global_clock", |b| {
            b.iter(|| {
                let _frame = instrumentation.enter(frame);
                black_box(());
            });
        });
    }

    if let Ok(clock) = ThreadClock::new() {
        let mut profiler = TracingProfiler::builder(&instrumentation)
            .clock(clock)
            .build();
        let _active = profiler.activate().unwrap();

        group.bench_function("traced_frame_thread_clock", |b| {
            b.iter(|| {
                let _frame = instrumentation.enter(frame);
                black_box(());
            });
        });
    }

    if let Ok(clock) = CooperativeClock::new() {
        let mut profiler = TracingProfiler::builder(&instrumentation)
            .clock(clock)
            .build();
        let _active = profiler.activate().unwrap();

        group.bench_function("traced_frame_cooperative_clock", |b| {
            b.iter(|| {
                let _frame = instrumentation.enter(frame);
                black_box(());
            });
        });
    }

    group.finish();
}
