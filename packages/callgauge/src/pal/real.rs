//! Real platform implementation using system calls.

use std::time::{Duration, Instant};

use cpu_time::ProcessTime;

use crate::pal::abstractions::Platform;

/// Real implementation of the platform abstraction.
///
/// Thread processor time comes from `clock_gettime(CLOCK_THREAD_CPUTIME_ID)` where the
/// platform offers it. Process processor time comes from the `cpu_time` package.
#[derive(Debug, Clone)]
pub(crate) struct RealPlatform {
    origin: Instant,
}

impl RealPlatform {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Platform for RealPlatform {
    fn wall_time(&self) -> Duration {
        self.origin.elapsed()
    }

    fn thread_time(&self) -> Option<Duration> {
        thread_cpu_time()
    }

    #[cfg_attr(test, mutants::skip)] // Real processor time is not deterministic.
    fn process_time(&self) -> Duration {
        ProcessTime::try_now()
            .map(|now| now.as_duration())
            .unwrap_or_default()
    }
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd"
))]
fn thread_cpu_time() -> Option<Duration> {
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    // SAFETY: `now` is a valid, writable timespec for the duration of the call.
    let result = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &raw mut now) };

    if result != 0 {
        return None;
    }

    let seconds = u64::try_from(now.tv_sec).ok()?;
    let nanoseconds = u32::try_from(now.tv_nsec).ok()?;

    Some(Duration::new(seconds, nanoseconds))
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd"
)))]
fn thread_cpu_time() -> Option<Duration> {
    None
}
