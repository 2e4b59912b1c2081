use std::fmt::Debug;
use std::thread::{self, ThreadId};
use std::time::Duration;

use cpu_time::ThreadTime;
use foldhash::{HashMap, HashMapExt};
use parking_lot::Mutex;

use crate::{Clock, ContextId, Error, Result};

/// An external source of cumulative per-thread processor time.
pub trait CpuAccounting: Debug + Send + Sync + 'static {
    /// The processor time consumed so far by `thread`, if the backend can tell.
    fn thread_time(&self, thread: ThreadId) -> Option<Duration>;
}

/// [`CpuAccounting`] backed by the `cpu_time` package.
///
/// Only the calling thread's processor time can be read.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct CpuTimeAccounting;

impl CpuTimeAccounting {
    /// Creates the backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CpuAccounting for CpuTimeAccounting {
    #[cfg_attr(test, mutants::skip)] // Real processor time is not deterministic.
    fn thread_time(&self, thread: ThreadId) -> Option<Duration> {
        if thread != thread::current().id() {
            return None;
        }

        ThreadTime::try_now().ok().map(|now| now.as_duration())
    }
}

/// A clock that delegates processor time accounting to an external backend.
///
/// Thread contexts are looked up by their own thread, cooperative contexts by the thread
/// that is executing them. When the backend has no answer, the context's previous reading
/// is repeated, so readings never fail and never decrease.
#[derive(Debug)]
pub struct AdapterClock<B> {
    backend: B,
    last_readings: Mutex<HashMap<ContextId, Duration>>,
}

impl<B> AdapterClock<B>
where
    B: CpuAccounting,
{
    /// Creates a clock that reads from `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityUnsupported`] if the backend cannot report the calling
    /// thread's processor time.
    pub fn new(backend: B) -> Result<Self> {
        if backend.thread_time(thread::current().id()).is_none() {
            return Err(Error::CapabilityUnsupported {
                capability: "external processor time accounting",
            });
        }

        Ok(Self {
            backend,
            last_readings: Mutex::new(HashMap::new()),
        })
    }

    /// The backend this clock delegates to.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B> Clock for AdapterClock<B>
where
    B: CpuAccounting,
{
    fn now_for(&self, context: ContextId) -> Duration {
        let thread = match context {
            ContextId::Thread(thread) => thread,
            ContextId::Cooperative(_) => thread::current().id(),
        };

        let reading = self.backend.thread_time(thread);

        let mut last_readings = self.last_readings.lock();
        let last = last_readings.entry(context).or_default();

        if let Some(reading) = reading {
            *last = (*last).max(reading);
        }

        *last
    }
}
