use std::time::Duration;

use crate::pal::{Platform, PlatformFacade};
use crate::{Clock, ContextId};

/// A single monotonic wall clock shared by every context.
///
/// This is the default clock. It needs no platform support, but a frame that is
/// suspended (sleeping, blocked or swapped out) keeps accumulating time while other
/// contexts run.
#[derive(Debug)]
pub struct GlobalClock {
    platform: PlatformFacade,
}

impl GlobalClock {
    /// Creates a wall clock starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            platform: PlatformFacade::real(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_platform(platform: PlatformFacade) -> Self {
        Self { platform }
    }
}

impl Default for GlobalClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for GlobalClock {
    fn now_for(&self, _context: ContextId) -> Duration {
        self.platform.wall_time()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::pal::FakePlatform;

    assert_impl_all!(GlobalClock: Send, Sync);

    #[test]
    fn ignores_context() {
        let platform = FakePlatform::new();
        let clock = GlobalClock::with_platform(PlatformFacade::fake(platform.clone()));

        platform.advance_wall(Duration::from_millis(25));

        assert_eq!(clock.now_for(ContextId::current()), Duration::from_millis(25));
        assert_eq!(
            clock.now_for(ContextId::new_cooperative()),
            Duration::from_millis(25)
        );
    }

    #[test]
    fn swaps_do_not_pause_time() {
        let platform = FakePlatform::new();
        let clock = GlobalClock::with_platform(PlatformFacade::fake(platform.clone()));
        let context = ContextId::new_cooperative();

        clock.swap_out(context);
        platform.advance_wall(Duration::from_millis(40));
        clock.swap_in(context);

        assert_eq!(clock.now_for(context), Duration::from_millis(40));
    }
}
