//! Profiles a small workload with both profilers and prints the resulting call trees.
//!
//! Run with: `cargo run --example callgauge_report`.

use std::thread;
use std::time::Duration;

use callgauge::{
    Instrumentation, Profiler, SamplingProfiler, SortKey, StatNode, StatTree, ThreadClock,
    TracingProfiler, location,
};
use testing::{burn_cpu, spin};

fn main() {
    let instrumentation = Instrumentation::new();

    let mut sampling = SamplingProfiler::builder(&instrumentation)
        .interval(Duration::from_micros(250))
        .build();
    sampling
        .profile(|| workload(&instrumentation))
        .expect("sampling profiler is used correctly");

    println!("=== Sampling profile (samples) ===");
    print_tree(&sampling.stats().expect("profiler is stopped"), |node| {
        format!("{} deep / {} own", node.deep_count(), node.own_count())
    });
    println!();

    let mut tracing = match ThreadClock::new() {
        Ok(clock) => TracingProfiler::builder(&instrumentation).clock(clock).build(),
        Err(error) => {
            println!("({error}; falling back to wall time)");
            TracingProfiler::builder(&instrumentation).build()
        }
    };
    tracing
        .profile(|| workload(&instrumentation))
        .expect("tracing profiler is used correctly");

    println!("=== Tracing profile (processor time) ===");
    print_tree(&tracing.stats().expect("profiler is stopped"), |node| {
        format!(
            "{} calls, {:?} deep, {:?} own, {:?} per call",
            node.own_count(),
            node.deep_time(),
            node.own_time(),
            node.deep_time_per_call()
        )
    });

    let times = tracing.profile_times().expect("profiler is stopped");
    println!();
    println!(
        "Profiled {:?} of wall time, {:?} of process processor time.",
        times.wall_time(),
        times.cpu_time()
    );
}

fn workload(instrumentation: &Instrumentation) {
    let _frame = instrumentation.enter(location!("workload"));

    for _ in 0..3 {
        parse(instrumentation);
    }

    thread::scope(|scope| {
        scope.spawn(|| {
            let _frame = instrumentation.enter(location!("background_flush"));
            thread::sleep(Duration::from_millis(20));
            burn_cpu(2);
        });

        render(instrumentation);
    });
}

fn parse(instrumentation: &Instrumentation) {
    let _frame = instrumentation.enter(location!("parse"));
    spin(Duration::from_millis(5));
    tokenize(instrumentation);
}

fn tokenize(instrumentation: &Instrumentation) {
    let _frame = instrumentation.enter(location!("tokenize"));
    spin(Duration::from_millis(3));
}

fn render(instrumentation: &Instrumentation) {
    let _frame = instrumentation.enter(location!("render"));
    spin(Duration::from_millis(30));
}

fn print_tree(tree: &StatTree, describe: impl Fn(&StatNode) -> String) {
    for node in tree.sorted_children(SortKey::DeepCount) {
        print_node(node, 0, &describe);
    }
}

fn print_node(node: &StatNode, indent: usize, describe: &impl Fn(&StatNode) -> String) {
    println!("{:indent$}{}: {}", "", node.name(), describe(node));

    for child in node.sorted_children(SortKey::DeepCount) {
        print_node(child, indent.saturating_add(2), describe);
    }
}
