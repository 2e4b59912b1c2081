//! Interval timers that drive the sampling profiler.

use std::fmt::Debug;
use std::panic;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::{Error, Result};

/// A source of periodic ticks.
///
/// The sampling profiler starts the timer when it becomes active and cancels it when it
/// stops. Ticks may arrive on any thread.
pub trait IntervalTimer: Debug + Send + 'static {
    /// Starts calling `tick` roughly every `interval` until [`cancel()`][Self::cancel]
    /// is called.
    ///
    /// Starting a timer that is already running replaces the previous schedule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimerUnavailable`] if the timer cannot be started.
    fn start(&mut self, interval: Duration, tick: Box<dyn FnMut() + Send>) -> Result<()>;

    /// Stops ticking. No tick is delivered after this returns.
    ///
    /// Cancelling a timer that is not running has no effect.
    fn cancel(&mut self);
}

/// An [`IntervalTimer`] that ticks from a dedicated background thread.
///
/// This is the default timer of the sampling profiler. Ticks are delivered on the timer
/// thread, never on the threads being profiled.
#[derive(Debug, Default)]
pub struct ThreadTimer {
    running: Option<RunningTimer>,
}

#[derive(Debug)]
struct RunningTimer {
    // Dropping the sender disconnects the channel, which ends the timer loop.
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl ThreadTimer {
    /// Creates a timer that is not yet running.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the timer thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl IntervalTimer for ThreadTimer {
    fn start(&mut self, interval: Duration, mut tick: Box<dyn FnMut() + Send>) -> Result<()> {
        self.cancel();

        let (stop, stopped) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("callgauge-sampler".to_string())
            .spawn(move || {
                debug!(?interval, "sampler timer thread started");

                while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(interval) {
                    tick();
                }

                debug!("sampler timer thread exiting");
            })
            .map_err(Error::TimerUnavailable)?;

        self.running = Some(RunningTimer { stop, thread });

        Ok(())
    }

    fn cancel(&mut self) {
        let Some(RunningTimer { stop, thread }) = self.running.take() else {
            return;
        };

        drop(stop);

        if let Err(payload) = thread.join() {
            // The tick callback is responsible for trapping its own panics.
            panic::resume_unwind(payload);
        }
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
pub(crate) use manual::ManualTimer;

#[cfg(test)]
mod manual {
    use std::fmt;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    type Tick = Box<dyn FnMut() + Send>;

    /// A timer that only ticks when the test says so.
    ///
    /// Clones share the same state, so a test can keep a clone to fire ticks after
    /// handing the timer to a profiler.
    #[derive(Clone, Default)]
    pub(crate) struct ManualTimer {
        tick: Arc<Mutex<Option<Tick>>>,
    }

    impl ManualTimer {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Delivers one tick if the timer is running. Returns whether it was.
        pub(crate) fn fire(&self) -> bool {
            match self.tick.lock().as_mut() {
                Some(tick) => {
                    tick();
                    true
                }
                None => false,
            }
        }
    }

    impl Debug for ManualTimer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ManualTimer")
                .field("running", &self.tick.lock().is_some())
                .finish()
        }
    }

    impl IntervalTimer for ManualTimer {
        fn start(&mut self, _interval: Duration, tick: Tick) -> Result<()> {
            *self.tick.lock() = Some(tick);
            Ok(())
        }

        fn cancel(&mut self) {
            self.tick.lock().take();
        }
    }
}
