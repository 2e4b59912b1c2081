//! Pluggable sources of per-context elapsed time.
//!
//! A [`Clock`] answers "how much active time has this context consumed" whenever the
//! tracing profiler observes a frame being entered or left. The choice of clock decides
//! how time is attributed when contexts interleave:
//!
//! * [`GlobalClock`] measures wall time shared by every context. A frame that waits while
//!   other contexts run is charged for their time as well.
//! * [`ThreadClock`] measures the processor time of the operating system thread, isolating
//!   threads from each other.
//! * [`CooperativeClock`] additionally isolates cooperative contexts that share a thread,
//!   using swap notifications to pause and resume per-context accumulators.
//! * [`AdapterClock`] delegates to an external [`CpuAccounting`] backend.

mod adapter;
mod cooperative;
mod global;
mod thread;

use std::fmt::Debug;
use std::time::Duration;

pub use adapter::{AdapterClock, CpuAccounting, CpuTimeAccounting};
pub use cooperative::CooperativeClock;
pub use global::GlobalClock;
pub use thread::ThreadClock;

use crate::ContextId;

/// Measures elapsed active time per context.
///
/// For any one context, successive readings never decrease for the lifetime of a
/// profiling run. Reading a clock never fails; clocks that depend on platform
/// capabilities check for them when they are created.
pub trait Clock: Debug + Send + Sync + 'static {
    /// The active time consumed so far by `context`.
    ///
    /// Called on the thread that is executing `context`.
    fn now_for(&self, context: ContextId) -> Duration;

    /// A cooperative scheduler resumed `context` on the calling thread.
    fn swap_in(&self, _context: ContextId) {}

    /// A cooperative scheduler suspended `context` on the calling thread.
    fn swap_out(&self, _context: ContextId) {}
}
