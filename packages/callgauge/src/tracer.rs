//! Exact call accounting driven by enter and leave events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use foldhash::{HashMap, HashMapExt};
use parking_lot::Mutex;
use tracing::warn;

use crate::stat_tree::Timing;
use crate::{
    Clock, CodeLocation, ContextId, Error, EventHook, FrameEvent, Instrumentation, StatTree,
    TopFrame,
};

/// The recording engine behind [`TracingProfiler`][crate::TracingProfiler].
///
/// Installed as an [`EventHook`] while the profiler is active.
#[derive(Debug)]
pub(crate) struct Tracer {
    // Our own handle in the form the instrumentation wants for uninstalling.
    this: Weak<Self>,

    instrumentation: Instrumentation,
    clock: Arc<dyn Clock>,
    top_frame: TopFrame,
    active: AtomicBool,
    state: Mutex<TraceState>,
}

#[derive(Debug)]
struct TraceState {
    tree: StatTree,

    /// Frames that have been entered but not yet left, per context.
    pending: HashMap<ContextId, Vec<Pending>>,

    /// Reused to build call paths without allocating.
    path: Vec<CodeLocation>,

    fault: Option<Error>,
}

#[derive(Debug)]
struct Pending {
    location: CodeLocation,
    depth: usize,
    started_at: Duration,
    callee_time: Duration,
}

impl Tracer {
    pub(crate) fn new(
        instrumentation: Instrumentation,
        clock: Arc<dyn Clock>,
        top_frame: TopFrame,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: Weak::clone(this),
            instrumentation,
            clock,
            top_frame,
            active: AtomicBool::new(false),
            state: Mutex::new(TraceState {
                tree: StatTree::new(),
                pending: HashMap::new(),
                path: Vec::new(),
                fault: None,
            }),
        })
    }

    pub(crate) fn top_frame(&self) -> TopFrame {
        self.top_frame
    }

    /// Begins receiving events. Statistics from earlier runs are kept.
    pub(crate) fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            state.pending.clear();
            state.fault = None;
        }

        self.active.store(true, Ordering::Release);
        self.instrumentation
            .install(Arc::clone(self) as Arc<dyn EventHook>);
    }

    /// Stops receiving events and returns the fault that ended the run early, if any.
    ///
    /// Frames that are still open are discarded: their calls are counted but their time
    /// is not.
    pub(crate) fn stop(&self) -> Option<Error> {
        self.active.store(false, Ordering::Release);
        self.uninstall();

        let mut state = self.state.lock();
        state.pending.clear();
        state.fault.take()
    }

    /// Whether the current run was ended by a fault.
    pub(crate) fn is_faulted(&self) -> bool {
        self.state.lock().fault.is_some()
    }

    pub(crate) fn snapshot(&self) -> StatTree {
        self.state.lock().tree.clone()
    }

    pub(crate) fn reset(&self) {
        self.state.lock().tree = StatTree::new();
    }

    fn uninstall(&self) {
        if let Some(this) = self.this.upgrade() {
            self.instrumentation
                .uninstall(&(this as Arc<dyn EventHook>));
        }
    }

    /// Whether the event lies above the top frame and must not be recorded.
    fn is_above_top_frame(&self, event: &FrameEvent) -> bool {
        event.depth < self.top_frame.first_recorded(event.context)
    }

    fn fail(&self, state: &mut TraceState, context: ContextId, location: CodeLocation) {
        warn!(%context, %location, "stack imbalance; tracing stopped");

        self.active.store(false, Ordering::Release);
        state.pending.clear();
        state.fault = Some(Error::StackImbalance { context, location });
    }
}

#[derive(Debug, Eq, PartialEq)]
enum Leave {
    Recorded,

    /// The frame was entered before tracing started.
    Ignored,

    Unbalanced,
}

impl TraceState {
    fn leave(&mut self, event: &FrameEvent, now: Duration) -> Leave {
        if !event.matched {
            return Leave::Unbalanced;
        }

        let Some(stack) = self.pending.get_mut(&event.context) else {
            return Leave::Ignored;
        };

        match stack.last() {
            Some(top) if top.depth == event.depth && top.location == event.location => {}
            _ => return Leave::Unbalanced,
        }

        self.path.clear();
        self.path.extend(stack.iter().map(|frame| frame.location));

        let Some(finished) = stack.pop() else {
            return Leave::Unbalanced;
        };

        let elapsed = now.saturating_sub(finished.started_at);
        let own = elapsed.saturating_sub(finished.callee_time);

        if let Some(caller) = stack.last_mut() {
            caller.callee_time = caller.callee_time.saturating_add(elapsed);
        }

        if stack.is_empty() {
            self.pending.remove(&event.context);
        }

        self.tree.record_return(&self.path, Timing { elapsed, own });

        Leave::Recorded
    }
}

impl EventHook for Tracer {
    fn on_enter(&self, event: &FrameEvent) {
        if !self.active.load(Ordering::Acquire) || self.is_above_top_frame(event) {
            return;
        }

        let now = self.clock.now_for(event.context);

        let mut state = self.state.lock();

        // Stopped while the clock was being read.
        if !self.active.load(Ordering::Acquire) {
            return;
        }

        let TraceState {
            tree,
            pending,
            path,
            ..
        } = &mut *state;

        let stack = pending.entry(event.context).or_default();
        stack.push(Pending {
            location: event.location,
            depth: event.depth,
            started_at: now,
            callee_time: Duration::ZERO,
        });

        path.clear();
        path.extend(stack.iter().map(|frame| frame.location));
        tree.record_call(path);
    }

    fn on_leave(&self, event: &FrameEvent) {
        if !self.active.load(Ordering::Acquire) || self.is_above_top_frame(event) {
            return;
        }

        let now = self.clock.now_for(event.context);

        let mut state = self.state.lock();

        if !self.active.load(Ordering::Acquire) {
            return;
        }

        if state.leave(event, now) == Leave::Unbalanced {
            self.fail(&mut state, event.context, event.location);
            drop(state);
            self.uninstall();
        }
    }

    fn on_swap_in(&self, context: ContextId) {
        self.clock.swap_in(context);
    }

    fn on_swap_out(&self, context: ContextId) {
        self.clock.swap_out(context);
    }
}
