use std::time::Duration;

use foldhash::{HashMap, HashMapExt};
use parking_lot::Mutex;

use crate::clock::thread::probe;
use crate::pal::{Platform, PlatformFacade};
use crate::{Clock, ContextId, Result};

/// Processor time isolated per cooperative context.
///
/// Cooperative contexts multiplexed onto one thread all advance that thread's processor
/// clock. This clock keeps an accumulator per cooperative context that only advances
/// between the scheduler's swap-in and swap-out notifications, so a context that is
/// suspended is not charged for the contexts that run in its place.
///
/// Plain thread contexts read the thread processor clock directly.
#[derive(Debug)]
pub struct CooperativeClock {
    platform: PlatformFacade,

    // Each accumulator is only touched by its own context's events and swaps. The lock
    // guards the map itself.
    accumulators: Mutex<HashMap<ContextId, Accumulator>>,
}

#[derive(Debug, Default)]
struct Accumulator {
    /// Processor time consumed during completed swap-in periods.
    consumed: Duration,

    /// Thread processor time at the most recent swap-in, while swapped in.
    resumed_at: Option<Duration>,
}

impl CooperativeClock {
    /// Creates a cooperative context clock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityUnsupported`][crate::Error::CapabilityUnsupported] if
    /// the platform has no per-thread processor clock.
    pub fn new() -> Result<Self> {
        Self::with_platform(PlatformFacade::real())
    }

    pub(crate) fn with_platform(platform: PlatformFacade) -> Result<Self> {
        probe(&platform)?;

        Ok(Self {
            platform,
            accumulators: Mutex::new(HashMap::new()),
        })
    }

    fn thread_time(&self) -> Duration {
        self.platform.thread_time().unwrap_or_default()
    }
}

impl Clock for CooperativeClock {
    fn now_for(&self, context: ContextId) -> Duration {
        let now = self.thread_time();

        if !context.is_cooperative() {
            return now;
        }

        let mut accumulators = self.accumulators.lock();

        // A context first seen mid-run starts counting from its first reading.
        let accumulator = accumulators.entry(context).or_insert_with(|| Accumulator {
            consumed: Duration::ZERO,
            resumed_at: Some(now),
        });

        match accumulator.resumed_at {
            Some(resumed_at) => accumulator
                .consumed
                .saturating_add(now.saturating_sub(resumed_at)),
            None => accumulator.consumed,
        }
    }

    fn swap_in(&self, context: ContextId) {
        let now = self.thread_time();

        self.accumulators
            .lock()
            .entry(context)
            .or_default()
            .resumed_at = Some(now);
    }

    fn swap_out(&self, context: ContextId) {
        let now = self.thread_time();

        if let Some(accumulator) = self.accumulators.lock().get_mut(&context)
            && let Some(resumed_at) = accumulator.resumed_at.take()
        {
            accumulator.consumed = accumulator
                .consumed
                .saturating_add(now.saturating_sub(resumed_at));
        }
    }
}
