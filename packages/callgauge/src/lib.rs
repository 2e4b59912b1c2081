#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! In-process call tree profiling with interchangeable capture strategies.
//!
//! Code marks its frames on an [`Instrumentation`] instance, which keeps a shadow call
//! stack for every execution context: each operating system thread and each cooperative
//! context such as a future wrapped by [`Instrumentation::cooperative()`]. Profilers
//! observe those stacks and aggregate what they see into a [`StatTree`], a call-path
//! keyed tree of counts and times rooted at the profiler's [`TopFrame`].
//!
//! Two profilers are available:
//!
//! - [`SamplingProfiler`] periodically captures the stacks of all running contexts.
//!   Samples are proportional to time spent in each frame and the overhead is
//!   independent of call frequency.
//! - [`TracingProfiler`] observes every frame being entered and left, producing exact
//!   call counts plus inclusive and exclusive time measured by a pluggable [`Clock`].
//!
//! The clock decides how time is attributed when contexts interleave. The default
//! [`GlobalClock`] measures wall time, so a frame that sleeps or waits while other
//! contexts run is charged for their time too. [`ThreadClock`] isolates threads from each
//! other and [`CooperativeClock`] also isolates cooperative contexts sharing one thread.
//!
//! # Tracing
//!
//! ```
//! use callgauge::{Instrumentation, Profiler, SortKey, TracingProfiler, location};
//!
//! fn parse(instrumentation: &Instrumentation, input: &str) -> usize {
//!     let _frame = instrumentation.enter(location!("parse"));
//!     input.split_whitespace().map(|word| tokenize(instrumentation, word)).sum()
//! }
//!
//! fn tokenize(instrumentation: &Instrumentation, word: &str) -> usize {
//!     let _frame = instrumentation.enter(location!("tokenize"));
//!     word.len()
//! }
//!
//! # fn main() -> callgauge::Result<()> {
//! let instrumentation = Instrumentation::new();
//! let mut profiler = TracingProfiler::builder(&instrumentation).build();
//!
//! let letters = profiler.profile(|| parse(&instrumentation, "a quick brown fox"))?;
//! assert_eq!(letters, 14);
//!
//! let stats = profiler.stats()?;
//! let parse_node = stats.find("parse").unwrap();
//! assert_eq!(parse_node.own_count(), 1);
//! assert_eq!(parse_node.deep_count(), 5);
//!
//! for callee in parse_node.sorted_children(SortKey::DeepTime) {
//!     println!("{}: {:?} in {} calls", callee.name(), callee.deep_time(), callee.own_count());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Sampling
//!
//! ```
//! use std::time::{Duration, Instant};
//!
//! use callgauge::{Instrumentation, Profiler, SamplingProfiler, location};
//!
//! # fn main() -> callgauge::Result<()> {
//! let instrumentation = Instrumentation::new();
//! let mut profiler = SamplingProfiler::builder(&instrumentation)
//!     .interval(Duration::from_micros(200))
//!     .build();
//!
//! profiler.profile(|| {
//!     let _frame = instrumentation.enter(location!("busy"));
//!     let started = Instant::now();
//!     while started.elapsed() < Duration::from_millis(20) {}
//! })?;
//!
//! let samples = profiler.stats()?.find("busy").map_or(0, |node| node.deep_count());
//! println!("busy was sampled {samples} times");
//! # Ok(())
//! # }
//! ```
//!
//! # Cooperative contexts
//!
//! Futures wrapped by [`Instrumentation::cooperative()`] keep their own call stack while
//! they are suspended. Schedulers that are not driven by futures can report context
//! switches with [`Instrumentation::notify_swap_in()`] and
//! [`Instrumentation::notify_swap_out()`] instead.

mod clock;
mod context;
mod cooperative;
mod error;
mod instrumentation;
mod location;
mod pal;
mod profiler;
mod sampler;
mod sampling_profiler;
mod stat_tree;
mod timer;
mod tracer;
mod tracing_profiler;

pub use clock::*;
pub use context::ContextId;
pub use cooperative::Cooperative;
pub use error::{Error, Result};
pub use instrumentation::{EventHook, Frame, FrameEvent, Instrumentation, TopFrame};
pub use location::CodeLocation;
pub use profiler::{ActiveProfiler, ProfileTimes, Profiler, ProfilerState};
pub use sampling_profiler::{DEFAULT_SAMPLING_INTERVAL, SamplingProfiler, SamplingProfilerBuilder};
pub use stat_tree::{Iter, SortKey, StatNode, StatTree};
pub use timer::{IntervalTimer, ThreadTimer};
pub use tracing_profiler::{TracingProfiler, TracingProfilerBuilder};
