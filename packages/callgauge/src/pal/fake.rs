//! Fake platform implementation for testing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::pal::abstractions::Platform;

/// Internal state for the fake platform that can be shared between clones.
#[derive(Debug)]
struct FakePlatformState {
    wall_time: Duration,
    thread_time: Option<Duration>,
    process_time: Duration,
}

/// Fake implementation of the platform abstraction for testing.
///
/// Multiple clones of the same `FakePlatform` share the same underlying time state,
/// allowing tests to modify time values after platform creation to simulate time
/// progression. There is a single thread clock shared by every caller.
#[derive(Clone, Debug)]
pub(crate) struct FakePlatform {
    state: Arc<Mutex<FakePlatformState>>,
}

impl FakePlatform {
    /// Creates a new fake platform with zero time values.
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakePlatformState {
                wall_time: Duration::ZERO,
                thread_time: Some(Duration::ZERO),
                process_time: Duration::ZERO,
            })),
        }
    }

    /// Creates a fake platform that has no per-thread processor clock.
    pub(crate) fn without_thread_time() -> Self {
        let platform = Self::new();
        platform
            .state
            .lock()
            .expect("FakePlatform state lock should not be poisoned")
            .thread_time = None;
        platform
    }

    pub(crate) fn set_wall_time(&self, time: Duration) {
        self.state
            .lock()
            .expect("FakePlatform state lock should not be poisoned")
            .wall_time = time;
    }

    pub(crate) fn set_thread_time(&self, time: Duration) {
        self.state
            .lock()
            .expect("FakePlatform state lock should not be poisoned")
            .thread_time = Some(time);
    }

    pub(crate) fn set_process_time(&self, time: Duration) {
        self.state
            .lock()
            .expect("FakePlatform state lock should not be poisoned")
            .process_time = time;
    }

    /// Advances the wall clock and the thread clock together, as if the calling
    /// thread were busy for `by`.
    pub(crate) fn advance(&self, by: Duration) {
        let mut state = self
            .state
            .lock()
            .expect("FakePlatform state lock should not be poisoned");

        state.wall_time = state.wall_time.saturating_add(by);
        state.thread_time = state.thread_time.map(|time| time.saturating_add(by));
        state.process_time = state.process_time.saturating_add(by);
    }

    /// Advances only the wall clock, as if the calling thread were blocked for `by`.
    pub(crate) fn advance_wall(&self, by: Duration) {
        let mut state = self
            .state
            .lock()
            .expect("FakePlatform state lock should not be poisoned");

        state.wall_time = state.wall_time.saturating_add(by);
    }
}

impl Platform for FakePlatform {
    fn wall_time(&self) -> Duration {
        self.state
            .lock()
            .expect("FakePlatform state lock should not be poisoned")
            .wall_time
    }

    fn thread_time(&self) -> Option<Duration> {
        self.state
            .lock()
            .expect("FakePlatform state lock should not be poisoned")
            .thread_time
    }

    fn process_time(&self) -> Duration {
        self.state
            .lock()
            .expect("FakePlatform state lock should not be poisoned")
            .process_time
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn initializes_with_zero_time() {
        let platform = FakePlatform::new();

        assert_eq!(platform.wall_time(), Duration::ZERO);
        assert_eq!(platform.thread_time(), Some(Duration::ZERO));
        assert_eq!(platform.process_time(), Duration::ZERO);
    }

    #[test]
    fn without_thread_time_reports_none() {
        let platform = FakePlatform::without_thread_time();

        assert_eq!(platform.thread_time(), None);
        platform.advance(Duration::from_millis(5));
        assert_eq!(platform.thread_time(), None);
        assert_eq!(platform.wall_time(), Duration::from_millis(5));
    }

    #[test]
    fn advance_moves_all_clocks() {
        let platform = FakePlatform::new();
        platform.advance(Duration::from_millis(10));

        assert_eq!(platform.wall_time(), Duration::from_millis(10));
        assert_eq!(platform.thread_time(), Some(Duration::from_millis(10)));
        assert_eq!(platform.process_time(), Duration::from_millis(10));
    }

    #[test]
    fn advance_wall_leaves_processor_clocks() {
        let platform = FakePlatform::new();
        platform.advance_wall(Duration::from_millis(10));

        assert_eq!(platform.wall_time(), Duration::from_millis(10));
        assert_eq!(platform.thread_time(), Some(Duration::ZERO));
    }

    #[test]
    fn shared_state_between_clones() {
        let platform1 = FakePlatform::new();
        let platform2 = platform1.clone();

        platform1.set_thread_time(Duration::from_millis(100));
        assert_eq!(platform2.thread_time(), Some(Duration::from_millis(100)));

        platform2.set_process_time(Duration::from_millis(200));
        assert_eq!(platform1.process_time(), Duration::from_millis(200));

        platform2.set_wall_time(Duration::from_millis(300));
        assert_eq!(platform1.wall_time(), Duration::from_millis(300));
    }
}
