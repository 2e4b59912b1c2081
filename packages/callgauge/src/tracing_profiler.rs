use std::sync::Arc;

use tracing::{debug, warn};

use crate::pal::PlatformFacade;
use crate::profiler::Lifecycle;
use crate::tracer::Tracer;
use crate::{
    Clock, Error, GlobalClock, Instrumentation, ProfileTimes, Profiler, ProfilerState, Result,
    StatTree, TopFrame,
};

/// A profiler that records every frame entered and left.
///
/// Call counts are exact and every completed call is timed with the configured
/// [`Clock`]. The cost grows with the number of calls made while active.
///
/// Inclusive time of a frame covers everything between entering and leaving it.
/// Exclusive time excludes the inclusive time of the frames it called. With the default
/// [`GlobalClock`], time that a frame spends suspended while other contexts run is
/// included; choose a [`ThreadClock`][crate::ThreadClock] or
/// [`CooperativeClock`][crate::CooperativeClock] to exclude it.
///
/// A leave event that does not match the most recent open frame of its context stops
/// the recording; [`stop()`][Profiler::stop] then returns
/// [`Error::StackImbalance`][crate::Error::StackImbalance]. Statistics of calls completed
/// before that point are kept.
///
/// # Examples
///
/// ```
/// use callgauge::{Instrumentation, Profiler, ThreadClock, TracingProfiler, location};
///
/// # fn main() -> callgauge::Result<()> {
/// let instrumentation = Instrumentation::new();
/// let mut profiler = TracingProfiler::builder(&instrumentation)
///     .clock(ThreadClock::new()?)
///     .build();
///
/// profiler.profile(|| {
///     let _frame = instrumentation.enter(location!("compute"));
/// })?;
///
/// let compute = profiler.stats()?.find("compute").cloned();
/// assert_eq!(compute.map(|node| node.own_count()), Some(1));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TracingProfiler {
    tracer: Arc<Tracer>,
    lifecycle: Lifecycle,

    // A fault from a run that was restarted or reset before `stop()` collected it.
    unreported: Option<Error>,
}

impl TracingProfiler {
    /// Starts configuring a tracing profiler that observes `instrumentation`.
    #[must_use]
    pub fn builder(instrumentation: &Instrumentation) -> TracingProfilerBuilder {
        TracingProfilerBuilder::new(instrumentation)
    }

    /// The point below which frames are recorded.
    #[must_use]
    pub fn top_frame(&self) -> TopFrame {
        self.tracer.top_frame()
    }
}

impl Profiler for TracingProfiler {
    fn start(&mut self) -> Result<()> {
        self.finish_faulted_run();
        self.lifecycle.ensure_inactive()?;

        self.tracer.start();
        self.lifecycle.begin();
        debug!("tracing profiler started");

        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.lifecycle.ensure_active()?;

        let fault = self.tracer.stop();
        self.lifecycle.end();
        debug!(faulted = fault.is_some(), "tracing profiler stopped");

        let fault = self.unreported.take().or(fault);

        fault.map_or(Ok(()), Err)
    }

    fn state(&self) -> ProfilerState {
        match self.lifecycle.state() {
            ProfilerState::Active if self.tracer.is_faulted() => ProfilerState::Stopped,
            state => state,
        }
    }

    fn stats(&self) -> Result<StatTree> {
        self.ensure_inactive()?;
        Ok(self.tracer.snapshot())
    }

    fn profile_times(&self) -> Result<ProfileTimes> {
        self.ensure_inactive()?;
        Ok(self.lifecycle.times())
    }

    fn reset(&mut self) -> Result<()> {
        self.finish_faulted_run();
        self.lifecycle.ensure_inactive()?;

        self.tracer.reset();
        self.lifecycle.reset();

        Ok(())
    }
}

impl TracingProfiler {
    // A faulted run has stopped recording, so its statistics may be read even before
    // `stop()` collects the fault.
    fn ensure_inactive(&self) -> Result<()> {
        if self.state() == ProfilerState::Active {
            return Err(Error::AlreadyActive);
        }

        Ok(())
    }

    /// Ends a run that a fault has already stopped, keeping the fault for the next
    /// `stop()`.
    fn finish_faulted_run(&mut self) {
        if self.lifecycle.state() != ProfilerState::Active || !self.tracer.is_faulted() {
            return;
        }

        let fault = self.tracer.stop();
        self.lifecycle.end();
        self.unreported = self.unreported.take().or(fault);
    }
}

impl Drop for TracingProfiler {
    fn drop(&mut self) {
        if self.lifecycle.state() == ProfilerState::Active {
            if let Err(error) = self.stop() {
                warn!(%error, "tracing profiler stopped with an error on drop");
            }
        } else if let Some(error) = self.unreported.take() {
            warn!(%error, "tracing profiler dropped with an unreported error");
        }
    }
}

/// Configures a [`TracingProfiler`].
///
/// Created by [`TracingProfiler::builder()`].
#[derive(Debug)]
#[must_use]
pub struct TracingProfilerBuilder {
    instrumentation: Instrumentation,
    top_frame: Option<TopFrame>,
    clock: Option<Arc<dyn Clock>>,
    platform: PlatformFacade,
}

impl TracingProfilerBuilder {
    fn new(instrumentation: &Instrumentation) -> Self {
        Self {
            instrumentation: instrumentation.clone(),
            top_frame: None,
            clock: None,
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

    /// Sets the clock that times each call.
    ///
    /// Defaults to a [`GlobalClock`].
    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Sets a clock that is shared with other profilers.
    pub fn shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[cfg(test)]
    pub(crate) fn platform(mut self, platform: PlatformFacade) -> Self {
        self.platform = platform;
        self
    }

    /// Creates the profiler in the [`Idle`][ProfilerState::Idle] state.
    #[must_use]
    pub fn build(self) -> TracingProfiler {
        let top_frame = self
            .top_frame
            .unwrap_or_else(|| self.instrumentation.top_frame());
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(GlobalClock::new()));

        TracingProfiler {
            tracer: Tracer::new(self.instrumentation, clock, top_frame),
            lifecycle: Lifecycle::new(self.platform),
            unreported: None,
        }
    }
}
