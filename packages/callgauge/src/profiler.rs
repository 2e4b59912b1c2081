//! The lifecycle shared by every profiler.

use std::time::Duration;

use scopeguard::ScopeGuard;
use tracing::warn;

use crate::pal::{Platform, PlatformFacade};
use crate::{Error, Result, StatTree};

/// The lifecycle state of a profiler.
///
/// A profiler starts out [`Idle`][Self::Idle], becomes [`Active`][Self::Active] when
/// started and [`Stopped`][Self::Stopped] when stopped. A stopped profiler may be started
/// again, accumulating into the same statistics.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ProfilerState {
    /// Created but never started, or reset.
    Idle,

    /// Collecting statistics.
    Active,

    /// No longer collecting; statistics may be read.
    Stopped,
}

/// Wall and processor time covered by a profiler's active periods.
///
/// Accumulated across start and stop cycles, so the numbers always describe the same
/// period as the profiler's [`StatTree`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProfileTimes {
    wall_time: Duration,
    cpu_time: Duration,
}

impl ProfileTimes {
    /// Wall time spent active.
    #[must_use]
    pub fn wall_time(&self) -> Duration {
        self.wall_time
    }

    /// Processor time consumed by the whole process while active.
    #[must_use]
    pub fn cpu_time(&self) -> Duration {
        self.cpu_time
    }
}

/// Collects call statistics for a region of program execution.
///
/// Start the profiler, run the code of interest and stop it again. The statistics can
/// then be read with [`stats()`][Self::stats]. [`profile()`][Self::profile] and
/// [`activate()`][Self::activate] take care of stopping the profiler on every exit path.
///
/// # Examples
///
/// ```
/// use callgauge::{Instrumentation, Profiler, ProfilerState, TracingProfiler, location};
///
/// let instrumentation = Instrumentation::new();
/// let mut profiler = TracingProfiler::builder(&instrumentation).build();
///
/// {
///     let _active = profiler.activate().unwrap();
///     let _frame = instrumentation.enter(location!("work"));
/// }
///
/// assert_eq!(profiler.state(), ProfilerState::Stopped);
/// assert!(profiler.stats().unwrap().find("work").is_some());
/// ```
pub trait Profiler {
    /// Starts collecting statistics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyActive`] if the profiler is active. Implementations may
    /// fail for other reasons, such as being unable to start a timer.
    fn start(&mut self) -> Result<()>;

    /// Stops collecting statistics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotActive`] if the profiler is not active, or the fault that
    /// ended collection early, such as [`Error::StackImbalance`]. Statistics collected
    /// before a fault remain available.
    fn stop(&mut self) -> Result<()>;

    /// The lifecycle state of the profiler.
    fn state(&self) -> ProfilerState;

    /// A snapshot of the statistics collected so far.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyActive`] while the profiler is active.
    fn stats(&self) -> Result<StatTree>;

    /// The wall and processor time covered by the statistics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyActive`] while the profiler is active.
    fn profile_times(&self) -> Result<ProfileTimes>;

    /// Discards all collected statistics and returns to [`ProfilerState::Idle`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyActive`] while the profiler is active.
    fn reset(&mut self) -> Result<()>;

    /// Runs `f` with the profiler active and stops it afterwards, even if `f` panics.
    ///
    /// # Errors
    ///
    /// Returns the error of [`start()`][Self::start] or [`stop()`][Self::stop]. If
    /// stopping fails, the value returned by `f` is lost.
    fn profile<R>(&mut self, f: impl FnOnce() -> R) -> Result<R>
    where
        Self: Sized,
    {
        self.start()?;

        let profiler = scopeguard::guard(self, |profiler| stop_quietly(profiler));
        let result = f();

        ScopeGuard::into_inner(profiler).stop()?;

        Ok(result)
    }

    /// Starts the profiler and returns a guard that stops it when dropped.
    ///
    /// # Errors
    ///
    /// Returns the error of [`start()`][Self::start].
    fn activate(&mut self) -> Result<ActiveProfiler<'_, Self>>
    where
        Self: Sized,
    {
        self.start()?;

        Ok(ActiveProfiler {
            profiler: Some(self),
        })
    }
}

/// Keeps a profiler active until dropped.
///
/// Created by [`Profiler::activate()`]. Dropping the guard stops the profiler and logs any
/// fault; call [`stop()`][Self::stop] instead to receive it.
#[derive(Debug)]
#[must_use = "the profiler is stopped as soon as the guard is dropped"]
pub struct ActiveProfiler<'a, P>
where
    P: Profiler,
{
    profiler: Option<&'a mut P>,
}

impl<P> ActiveProfiler<'_, P>
where
    P: Profiler,
{
    /// Stops the profiler.
    ///
    /// # Errors
    ///
    /// Returns the error of [`Profiler::stop()`].
    pub fn stop(mut self) -> Result<()> {
        match self.profiler.take() {
            Some(profiler) => profiler.stop(),
            None => Ok(()),
        }
    }
}

impl<P> Drop for ActiveProfiler<'_, P>
where
    P: Profiler,
{
    fn drop(&mut self) {
        if let Some(profiler) = self.profiler.take() {
            stop_quietly(profiler);
        }
    }
}

fn stop_quietly(profiler: &mut impl Profiler) {
    match profiler.stop() {
        Ok(()) | Err(Error::NotActive) => {}
        Err(error) => warn!(%error, "profiler stopped with an error nobody will receive"),
    }
}

/// State machine and time accounting shared by the profiler implementations.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    platform: PlatformFacade,
    state: ProfilerState,

    // Wall and process time at the most recent start.
    started_at: (Duration, Duration),

    times: ProfileTimes,
}

impl Lifecycle {
    pub(crate) fn new(platform: PlatformFacade) -> Self {
        Self {
            platform,
            state: ProfilerState::Idle,
            started_at: (Duration::ZERO, Duration::ZERO),
            times: ProfileTimes::default(),
        }
    }

    pub(crate) fn state(&self) -> ProfilerState {
        self.state
    }

    pub(crate) fn ensure_inactive(&self) -> Result<()> {
        if self.state == ProfilerState::Active {
            return Err(Error::AlreadyActive);
        }

        Ok(())
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.state != ProfilerState::Active {
            return Err(Error::NotActive);
        }

        Ok(())
    }

    /// Enters the active state. The caller has checked [`ensure_inactive()`][Self::ensure_inactive].
    pub(crate) fn begin(&mut self) {
        self.started_at = (self.platform.wall_time(), self.platform.process_time());
        self.state = ProfilerState::Active;
    }

    /// Leaves the active state. The caller has checked [`ensure_active()`][Self::ensure_active].
    pub(crate) fn end(&mut self) {
        let (wall_start, cpu_start) = self.started_at;

        self.times.wall_time = self
            .times
            .wall_time
            .saturating_add(self.platform.wall_time().saturating_sub(wall_start));
        self.times.cpu_time = self
            .times
            .cpu_time
            .saturating_add(self.platform.process_time().saturating_sub(cpu_start));

        self.state = ProfilerState::Stopped;
    }

    pub(crate) fn times(&self) -> ProfileTimes {
        self.times
    }

    pub(crate) fn reset(&mut self) {
        self.times = ProfileTimes::default();
        self.state = ProfilerState::Idle;
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::pal::FakePlatform;

    #[test]
    fn lifecycle_transitions() {
        let mut lifecycle = Lifecycle::new(PlatformFacade::fake(FakePlatform::new()));
        assert_eq!(lifecycle.state(), ProfilerState::Idle);
        assert!(matches!(lifecycle.ensure_active(), Err(Error::NotActive)));

        lifecycle.ensure_inactive().unwrap();
        lifecycle.begin();
        assert_eq!(lifecycle.state(), ProfilerState::Active);
        assert!(matches!(lifecycle.ensure_inactive(), Err(Error::AlreadyActive)));

        lifecycle.ensure_active().unwrap();
        lifecycle.end();
        assert_eq!(lifecycle.state(), ProfilerState::Stopped);

        lifecycle.reset();
        assert_eq!(lifecycle.state(), ProfilerState::Idle);
    }

    #[test]
    fn times_cover_only_active_periods() {
        let platform = FakePlatform::new();
        let mut lifecycle = Lifecycle::new(PlatformFacade::fake(platform.clone()));

        lifecycle.begin();
        platform.advance(Duration::from_millis(10));
        lifecycle.end();

        platform.advance(Duration::from_millis(1000));

        lifecycle.begin();
        platform.advance_wall(Duration::from_millis(5));
        lifecycle.end();

        let times = lifecycle.times();
        assert_eq!(times.wall_time(), Duration::from_millis(15));
        assert_eq!(times.cpu_time(), Duration::from_millis(10));

        lifecycle.reset();
        assert_eq!(lifecycle.times(), ProfileTimes::default());
    }
}
