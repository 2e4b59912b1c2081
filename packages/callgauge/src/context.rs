//! Logical execution contexts whose time is accounted separately.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

static NEXT_COOPERATIVE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_COOPERATIVE: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Identifies a logical execution context.
///
/// A context is either an operating system thread or a cooperatively scheduled
/// context (such as a future wrapped by
/// [`Instrumentation::cooperative()`][crate::Instrumentation::cooperative]) that is
/// multiplexed onto whichever thread polls it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ContextId {
    /// An operating system thread.
    Thread(ThreadId),

    /// A cooperatively scheduled context.
    Cooperative(u64),
}

impl ContextId {
    /// Returns the context that is executing on the calling thread.
    ///
    /// This is the cooperative context currently swapped in on this thread, if any,
    /// otherwise the thread itself.
    #[must_use]
    pub fn current() -> Self {
        CURRENT_COOPERATIVE
            .with(Cell::get)
            .map_or_else(Self::current_thread, Self::Cooperative)
    }

    /// Returns the context of the calling thread, ignoring any swapped-in
    /// cooperative context.
    #[must_use]
    pub fn current_thread() -> Self {
        Self::Thread(thread::current().id())
    }

    /// Whether this is a cooperatively scheduled context.
    #[must_use]
    pub fn is_cooperative(&self) -> bool {
        matches!(self, Self::Cooperative(_))
    }

    /// Allocates an identity for a new cooperative context, distinct from every other
    /// context in the process.
    ///
    /// Schedulers that report their own swaps through
    /// [`Instrumentation::notify_swap_in()`][crate::Instrumentation::notify_swap_in] use
    /// this to name the contexts they run.
    #[must_use]
    pub fn new_cooperative() -> Self {
        Self::Cooperative(NEXT_COOPERATIVE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thread(id) => write!(f, "thread {id:?}"),
            Self::Cooperative(id) => write!(f, "cooperative context {id}"),
        }
    }
}

/// Marks `context` as the cooperative context running on this thread and returns
/// whatever was marked before, to be handed back to [`restore_current()`].
pub(crate) fn replace_current(context: ContextId) -> Option<u64> {
    let raw = match context {
        ContextId::Cooperative(id) => Some(id),
        ContextId::Thread(_) => None,
    };

    CURRENT_COOPERATIVE.with(|current| current.replace(raw))
}

pub(crate) fn restore_current(previous: Option<u64>) {
    CURRENT_COOPERATIVE.with(|current| current.set(previous));
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(ContextId: Send, Sync, Copy);

    #[test]
    fn current_defaults_to_thread() {
        assert_eq!(ContextId::current(), ContextId::current_thread());
        assert!(!ContextId::current().is_cooperative());
    }

    #[test]
    fn threads_have_distinct_contexts() {
        let here = ContextId::current();
        let there = thread::spawn(ContextId::current).join().unwrap();

        assert_ne!(here, there);
    }

    #[test]
    fn cooperative_ids_are_unique() {
        let first = ContextId::new_cooperative();
        let second = ContextId::new_cooperative();

        assert_ne!(first, second);
        assert!(first.is_cooperative());
    }

    #[test]
    fn replace_and_restore_current() {
        let cooperative = ContextId::new_cooperative();

        let previous = replace_current(cooperative);
        assert_eq!(ContextId::current(), cooperative);
        assert_eq!(ContextId::current_thread(), ContextId::Thread(thread::current().id()));

        restore_current(previous);
        assert_eq!(ContextId::current(), ContextId::current_thread());
    }
}
