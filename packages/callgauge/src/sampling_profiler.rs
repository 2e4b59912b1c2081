use std::time::Duration;

use tracing::{debug, warn};

use crate::pal::PlatformFacade;
use crate::profiler::Lifecycle;
use crate::sampler::Sampler;
use crate::{
    Instrumentation, IntervalTimer, ProfileTimes, Profiler, ProfilerState, Result, StatTree,
    ThreadTimer, TopFrame,
};

/// The sampling interval used unless configured otherwise.
pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_millis(1);

/// A profiler that periodically samples the call stacks of running contexts.
///
/// Every tick of its [`IntervalTimer`] captures the stack of each running context and
/// credits one sample to every frame on it. Sample counts are proportional to the time
/// spent in each frame and the overhead does not depend on how often functions are
/// called, but no times are recorded and very short calls may be missed.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use callgauge::{Instrumentation, Profiler, SamplingProfiler};
///
/// let instrumentation = Instrumentation::new();
/// let mut profiler = SamplingProfiler::builder(&instrumentation)
///     .interval(Duration::from_micros(500))
///     .build();
///
/// profiler.profile(|| { /* work */ }).unwrap();
///
/// let stats = profiler.stats().unwrap();
/// # drop(stats);
/// ```
#[derive(Debug)]
pub struct SamplingProfiler {
    sampler: Sampler,
    interval: Duration,
    timer: Box<dyn IntervalTimer>,
    lifecycle: Lifecycle,
}

impl SamplingProfiler {
    /// Starts configuring a sampling profiler that observes `instrumentation`.
    #[must_use]
    pub fn builder(instrumentation: &Instrumentation) -> SamplingProfilerBuilder {
        SamplingProfilerBuilder::new(instrumentation)
    }

    /// The time between samples.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The point below which stacks are recorded.
    #[must_use]
    pub fn top_frame(&self) -> TopFrame {
        self.sampler.top_frame()
    }
}

impl Profiler for SamplingProfiler {
    fn start(&mut self) -> Result<()> {
        self.lifecycle.ensure_inactive()?;

        self.sampler.activate();

        let sampler = self.sampler.clone();
        if let Err(error) = self
            .timer
            .start(self.interval, Box::new(move || sampler.sample()))
        {
            self.sampler.deactivate();
            return Err(error);
        }

        self.lifecycle.begin();
        debug!(interval = ?self.interval, "sampling profiler started");

        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.lifecycle.ensure_active()?;

        self.sampler.deactivate();
        self.timer.cancel();
        self.lifecycle.end();

        debug!("sampling profiler stopped");

        Ok(())
    }

    fn state(&self) -> ProfilerState {
        self.lifecycle.state()
    }

    fn stats(&self) -> Result<StatTree> {
        self.lifecycle.ensure_inactive()?;
        Ok(self.sampler.snapshot())
    }

    fn profile_times(&self) -> Result<ProfileTimes> {
        self.lifecycle.ensure_inactive()?;
        Ok(self.lifecycle.times())
    }

    fn reset(&mut self) -> Result<()> {
        self.lifecycle.ensure_inactive()?;

        self.sampler.reset();
        self.lifecycle.reset();

        Ok(())
    }
}

impl Drop for SamplingProfiler {
    fn drop(&mut self) {
        if self.lifecycle.state() == ProfilerState::Active
            && let Err(error) = self.stop()
        {
            warn!(%error, "failed to stop sampling profiler on drop");
        }
    }
}

/// Configures a [`SamplingProfiler`].
///
/// Created by [`SamplingProfiler::builder()`].
#[derive(Debug)]
#[must_use]
pub struct SamplingProfilerBuilder {
    instrumentation: Instrumentation,
    top_frame: Option<TopFrame>,
    interval: Duration,
    timer: Option<Box<dyn IntervalTimer>>,
    platform: PlatformFacade,
}

impl SamplingProfilerBuilder {
    fn new(instrumentation: &Instrumentation) -> Self {
        Self {
            instrumentation: instrumentation.clone(),
            top_frame: None,
            interval: DEFAULT_SAMPLING_INTERVAL,
            timer: None,
            platform: PlatformFacade::real(),
        }
    }

    /// Records only frames below `top_frame`.
    ///
    /// Defaults to the position of the context that calls [`build()`][Self::build].
    pub fn top_frame(mut self, top_frame: TopFrame) -> Self {
        self.top_frame = Some(top_frame);
        self
    }

    /// Sets the time between samples.
    ///
    /// Defaults to [`DEFAULT_SAMPLING_INTERVAL`].
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn interval(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "sampling interval must be positive");

        self.interval = interval;
        self
    }

    /// Sets the source of sampling ticks.
    ///
    /// Defaults to a [`ThreadTimer`].
    pub fn timer(mut self, timer: impl IntervalTimer) -> Self {
        self.timer = Some(Box::new(timer));
        self
    }

    #[cfg(test)]
    pub(crate) fn platform(mut self, platform: PlatformFacade) -> Self {
        self.platform = platform;
        self
    }

    /// Creates the profiler in the [`Idle`][ProfilerState::Idle] state.
    #[must_use]
    pub fn build(self) -> SamplingProfiler {
        let top_frame = self
            .top_frame
            .unwrap_or_else(|| self.instrumentation.top_frame());

        SamplingProfiler {
            sampler: Sampler::new(self.instrumentation, top_frame),
            interval: self.interval,
            timer: self
                .timer
                .unwrap_or_else(|| Box::new(ThreadTimer::new())),
            lifecycle: Lifecycle::new(self.platform),
        }
    }
}
