use std::time::Duration;

use crate::pal::{Platform, PlatformFacade};
use crate::{Clock, ContextId, Error, Result};

pub(crate) const THREAD_CLOCK_CAPABILITY: &str = "per-thread processor clock";

/// The processor time of the operating system thread executing a context.
///
/// The operating system does not advance one thread's processor clock while another
/// thread runs, so threads never see each other's time. Cooperative contexts sharing a
/// thread are not told apart; use [`CooperativeClock`][crate::CooperativeClock] for that.
#[derive(Debug)]
pub struct ThreadClock {
    platform: PlatformFacade,
}

impl ThreadClock {
    /// Creates a thread processor clock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityUnsupported`] if the platform has no per-thread
    /// processor clock.
    pub fn new() -> Result<Self> {
        Self::with_platform(PlatformFacade::real())
    }

    pub(crate) fn with_platform(platform: PlatformFacade) -> Result<Self> {
        probe(&platform)?;
        Ok(Self { platform })
    }
}

/// Fails unless the platform can read the calling thread's processor time.
pub(crate) fn probe(platform: &PlatformFacade) -> Result<()> {
    platform
        .thread_time()
        .map(|_| ())
        .ok_or(Error::CapabilityUnsupported {
            capability: THREAD_CLOCK_CAPABILITY,
        })
}

impl Clock for ThreadClock {
    fn now_for(&self, _context: ContextId) -> Duration {
        // Availability was probed on creation.
        self.platform.thread_time().unwrap_or_default()
    }
}
