//! Platform facade for switching between real and fake implementations.

use std::time::Duration;

use crate::pal::abstractions::Platform;
#[cfg(test)]
use crate::pal::fake::FakePlatform;
use crate::pal::real::RealPlatform;

/// Facade that allows switching between real and fake platform implementations.
#[derive(Debug, Clone)]
pub(crate) enum PlatformFacade {
    /// Real platform implementation using system calls.
    Real(RealPlatform),

    /// Fake platform implementation for testing.
    #[cfg(test)]
    Fake(FakePlatform),
}

impl PlatformFacade {
    /// Creates a new platform facade using the real implementation.
    pub(crate) fn real() -> Self {
        Self::Real(RealPlatform::new())
    }

    /// Creates a new platform facade using the fake implementation.
    #[cfg(test)]
    pub(crate) fn fake(fake_platform: FakePlatform) -> Self {
        Self::Fake(fake_platform)
    }
}

impl Platform for PlatformFacade {
    fn wall_time(&self) -> Duration {
        match self {
            Self::Real(platform) => platform.wall_time(),
            #[cfg(test)]
            Self::Fake(platform) => platform.wall_time(),
        }
    }

    fn thread_time(&self) -> Option<Duration> {
        match self {
            Self::Real(platform) => platform.thread_time(),
            #[cfg(test)]
            Self::Fake(platform) => platform.thread_time(),
        }
    }

    fn process_time(&self) -> Duration {
        match self {
            Self::Real(platform) => platform.process_time(),
            #[cfg(test)]
            Self::Fake(platform) => platform.process_time(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn fake_readings_pass_through() {
        let fake_platform = FakePlatform::new();
        fake_platform.set_wall_time(Duration::from_millis(100));
        fake_platform.set_thread_time(Duration::from_millis(300));
        fake_platform.set_process_time(Duration::from_millis(400));

        let facade = PlatformFacade::fake(fake_platform);

        assert_eq!(facade.wall_time(), Duration::from_millis(100));
        assert_eq!(facade.thread_time(), Some(Duration::from_millis(300)));
        assert_eq!(facade.process_time(), Duration::from_millis(400));
    }

    #[test]
    #[cfg_attr(miri, ignore)] // Miri cannot use the real operating system APIs.
    fn real_wall_time_is_monotonic() {
        let facade = PlatformFacade::real();

        let first = facade.wall_time();
        let second = facade.wall_time();

        assert!(second >= first);
    }
}
