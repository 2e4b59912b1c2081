//! Futures that run as their own cooperative context.

use std::future::Future;
use std::pin::Pin;
use std::task::{self, Poll};

use crate::{ContextId, Instrumentation};

/// A future that runs as a distinct cooperative context.
///
/// Each poll swaps the context in on the polling thread and swaps it out again when the
/// poll returns, whether it completes, suspends or panics. Created by
/// [`Instrumentation::cooperative()`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Cooperative<F> {
    instrumentation: Instrumentation,
    context: ContextId,
    future: Pin<Box<F>>,
}

impl<F> Cooperative<F> {
    pub(crate) fn new(instrumentation: Instrumentation, context: ContextId, future: F) -> Self {
        Self {
            instrumentation,
            context,
            future: Box::pin(future),
        }
    }

    /// The context this future runs as.
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }
}

impl<F> Future for Cooperative<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        let Self {
            instrumentation,
            context,
            future,
        } = &mut *self;

        let context = *context;
        let previous = instrumentation.swap_in(context);

        let _swap_out = scopeguard::guard(previous, |previous| {
            instrumentation.swap_out(context, previous);
        });

        future.as_mut().poll(cx)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::task::Waker;

    use super::*;
    use crate::location;

    #[test]
    fn poll_runs_inside_own_context() {
        let instrumentation = Instrumentation::new();
        let outer_context = ContextId::current();

        let inside = Arc::new(parking_lot::Mutex::new(None));
        let inside_clone = Arc::clone(&inside);
        let task_instrumentation = instrumentation.clone();

        let mut task = Box::pin(instrumentation.cooperative(async move {
            let _frame = task_instrumentation.enter(location!("task"));
            *inside_clone.lock() = Some(ContextId::current());
        }));

        let expected = task.context();
        let mut cx = task::Context::from_waker(Waker::noop());
        assert!(task.as_mut().poll(&mut cx).is_ready());

        assert_eq!(*inside.lock(), Some(expected));
        assert!(expected.is_cooperative());
        assert_eq!(ContextId::current(), outer_context);
        assert!(instrumentation.stack_of(expected).is_empty());
    }

    #[test]
    fn frames_stay_with_suspended_context() {
        let instrumentation = Instrumentation::new();
        let task_instrumentation = instrumentation.clone();

        let mut task = Box::pin(instrumentation.cooperative(async move {
            let _frame = task_instrumentation.enter(location!("suspended"));
            YieldOnce::default().await;
        }));

        let context = task.context();
        let mut cx = task::Context::from_waker(Waker::noop());

        assert!(task.as_mut().poll(&mut cx).is_pending());
        assert_eq!(instrumentation.stack_of(context).len(), 1);
        assert!(instrumentation.stack_of(ContextId::current()).is_empty());

        assert!(task.as_mut().poll(&mut cx).is_ready());
        assert!(instrumentation.stack_of(context).is_empty());
    }

    #[derive(Default)]
    struct YieldOnce {
        yielded: bool,
    }

    impl Future for YieldOnce {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<()> {
            if self.yielded {
                Poll::Ready(())
            } else {
                self.yielded = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}
