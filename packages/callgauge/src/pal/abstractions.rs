//! Platform abstraction trait definitions.

use std::fmt::Debug;
use std::time::Duration;

/// Provides the clock readings that the profiling engine is built on.
///
/// This trait abstracts the underlying platform-specific clocks, allowing for both
/// real implementations (using system calls) and fake implementations (for testing).
pub(crate) trait Platform: Debug + Send + Sync + 'static {
    /// Monotonic wall-clock time elapsed since a fixed origin.
    fn wall_time(&self) -> Duration;

    /// Processor time consumed so far by the calling thread.
    ///
    /// Returns `None` if the platform has no per-thread processor clock.
    fn thread_time(&self) -> Option<Duration>;

    /// Processor time consumed so far by the whole process.
    fn process_time(&self) -> Duration;
}
