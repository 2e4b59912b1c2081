//! Shadow call stacks and event dispatch for instrumented code.

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;
use foldhash::{HashMap, HashMapExt};
use parking_lot::Mutex;

use crate::context::{self, ContextId};
use crate::{CodeLocation, Cooperative};

/// A frame entering or leaving a context's call stack.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct FrameEvent {
    /// The context whose call stack changed.
    pub context: ContextId,

    /// The location being entered or left.
    pub location: CodeLocation,

    /// Zero-based position of the frame in the context's call stack.
    ///
    /// For an unmatched leave event this is the current stack length.
    pub depth: usize,

    /// Whether the event kept the call stack balanced.
    ///
    /// Always `true` for enter events. A leave event is matched if it named the frame on
    /// top of its context's stack.
    pub matched: bool,
}

/// Receives call stack and context switch notifications from an [`Instrumentation`].
///
/// Hooks run synchronously on the thread that produced the event and must not block
/// for long. Profilers install their own hooks; implement this to attach additional
/// observers via [`Instrumentation::install()`].
pub trait EventHook: Send + Sync + 'static {
    /// A frame was entered.
    fn on_enter(&self, event: &FrameEvent);

    /// A frame was left.
    fn on_leave(&self, event: &FrameEvent);

    /// A cooperative context was resumed on the calling thread.
    fn on_swap_in(&self, _context: ContextId) {}

    /// A cooperative context was suspended on the calling thread.
    fn on_swap_out(&self, _context: ContextId) {}
}

/// The live call stacks of every context plus the hooks that observe them.
///
/// Instrumented code marks its frames with [`enter()`][Self::enter], which pushes a
/// [`CodeLocation`] onto the calling context's stack and returns a guard that pops it.
/// Profilers attach to an instrumentation instance to observe these frames: the tracing
/// profiler receives every enter and leave event, while the sampling profiler
/// periodically snapshots the stacks.
///
/// This type is a cheaply cloneable handle; clones share the same stacks and hooks.
///
/// # Examples
///
/// ```
/// use callgauge::{Instrumentation, location};
///
/// let instrumentation = Instrumentation::new();
///
/// {
///     let _frame = instrumentation.enter(location!("outer"));
///     let _inner = instrumentation.enter(location!("inner"));
///     // The calling thread now has two frames on its stack.
/// }
/// ```
#[derive(Clone)]
pub struct Instrumentation {
    inner: Arc<InstrumentationInner>,
}

struct InstrumentationInner {
    stacks: Mutex<HashMap<ContextId, ContextStack>>,
    hooks: ArcSwap<Vec<Arc<dyn EventHook>>>,
}

#[derive(Debug)]
struct ContextStack {
    frames: Vec<CodeLocation>,

    // Threads always run; cooperative contexts only between swap-in and swap-out.
    running: bool,
}

impl Instrumentation {
    /// Creates an instrumentation instance with empty stacks and no hooks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(InstrumentationInner {
                stacks: Mutex::new(HashMap::new()),
                hooks: ArcSwap::from_pointee(Vec::new()),
            }),
        }
    }

    /// Enters a frame on the calling context's stack.
    ///
    /// The frame is left when the returned guard is dropped, on every exit path.
    pub fn enter(&self, location: CodeLocation) -> Frame<'_> {
        self.notify_enter(location);

        Frame {
            instrumentation: self,
            location,
        }
    }

    /// Reports that the calling context entered `location`, without a guard.
    ///
    /// Every call must be balanced by a [`notify_leave()`][Self::notify_leave] for the
    /// same location from the same context.
    pub fn notify_enter(&self, location: CodeLocation) {
        let context = ContextId::current();

        let depth = {
            let mut stacks = self.inner.stacks.lock();
            let stack = stacks.entry(context).or_insert_with(ContextStack::new);
            let depth = stack.frames.len();
            stack.frames.push(location);
            depth
        };

        let event = FrameEvent {
            context,
            location,
            depth,
            matched: true,
        };

        for hook in self.inner.hooks.load().iter() {
            hook.on_enter(&event);
        }
    }

    /// Reports that the calling context left `location`.
    ///
    /// The frame is popped if it is on top of the context's stack. Leave events that do
    /// not match are still delivered to hooks, which decide how to react to them.
    pub fn notify_leave(&self, location: CodeLocation) {
        let context = ContextId::current();

        let (depth, matched) = {
            let mut stacks = self.inner.stacks.lock();

            match stacks.get_mut(&context) {
                Some(stack) if stack.frames.last() == Some(&location) => {
                    stack.frames.pop();
                    let depth = stack.frames.len();

                    if depth == 0 {
                        stacks.remove(&context);
                    }

                    (depth, true)
                }
                Some(stack) => (stack.frames.len(), false),
                None => (0, false),
            }
        };

        let event = FrameEvent {
            context,
            location,
            depth,
            matched,
        };

        for hook in self.inner.hooks.load().iter() {
            hook.on_leave(&event);
        }
    }

    /// Reports that a cooperative scheduler resumed `context` on the calling thread.
    ///
    /// Until the matching [`notify_swap_out()`][Self::notify_swap_out], events from this
    /// thread are attributed to `context`.
    pub fn notify_swap_in(&self, context: ContextId) {
        self.swap_in(context);
    }

    /// Reports that a cooperative scheduler suspended `context` on the calling thread.
    pub fn notify_swap_out(&self, context: ContextId) {
        self.swap_out(context, None);
    }

    /// Wraps a future so that it runs as its own cooperative context.
    ///
    /// Every poll of the returned future is bracketed by swap-in and swap-out
    /// notifications, so frames entered by the future are kept on a call stack separate
    /// from the thread that happens to poll it.
    pub fn cooperative<F>(&self, future: F) -> Cooperative<F>
    where
        F: Future,
    {
        Cooperative::new(self.clone(), ContextId::new_cooperative(), future)
    }

    /// Captures the current position of the calling context as a [`TopFrame`].
    ///
    /// Profilers rooted here do not record the frames that are already on the calling
    /// context's stack.
    #[must_use]
    pub fn top_frame(&self) -> TopFrame {
        let context = ContextId::current();

        let depth = self
            .inner
            .stacks
            .lock()
            .get(&context)
            .map_or(0, |stack| stack.frames.len());

        TopFrame { context, depth }
    }

    /// Installs a hook that receives every subsequent event.
    pub fn install(&self, hook: Arc<dyn EventHook>) {
        self.inner.hooks.rcu(|hooks| {
            let mut hooks = Vec::clone(hooks);
            hooks.push(Arc::clone(&hook));
            hooks
        });
    }

    /// Removes a previously installed hook.
    ///
    /// It is safe to call this from within the hook's own event handlers. Returns whether
    /// the hook was installed.
    pub fn uninstall(&self, hook: &Arc<dyn EventHook>) -> bool {
        let previous = self.inner.hooks.rcu(|hooks| {
            hooks
                .iter()
                .filter(|installed| !Arc::ptr_eq(installed, hook))
                .cloned()
                .collect::<Vec<_>>()
        });

        previous.iter().any(|installed| Arc::ptr_eq(installed, hook))
    }

    /// Returns the call stack of `context`, outermost frame first.
    #[must_use]
    pub fn stack_of(&self, context: ContextId) -> Vec<CodeLocation> {
        self.inner
            .stacks
            .lock()
            .get(&context)
            .map(|stack| stack.frames.clone())
            .unwrap_or_default()
    }

    /// Visits the non-empty stack of every running context, if the stacks can be locked
    /// without waiting.
    ///
    /// Returns `false` without visiting anything if another thread holds the lock.
    pub(crate) fn try_for_each_running(
        &self,
        mut visit: impl FnMut(ContextId, &[CodeLocation]),
    ) -> bool {
        let Some(stacks) = self.inner.stacks.try_lock() else {
            return false;
        };

        for (context, stack) in stacks.iter() {
            if stack.running {
                visit(*context, &stack.frames);
            }
        }

        true
    }

    /// Marks `context` as running on this thread and returns the previously running
    /// cooperative context, for [`swap_out()`][Self::swap_out] to restore.
    pub(crate) fn swap_in(&self, context: ContextId) -> Option<u64> {
        let previous = context::replace_current(context);
        self.set_running(context, true);

        for hook in self.inner.hooks.load().iter() {
            hook.on_swap_in(context);
        }

        previous
    }

    pub(crate) fn swap_out(&self, context: ContextId, previous: Option<u64>) {
        for hook in self.inner.hooks.load().iter() {
            hook.on_swap_out(context);
        }

        self.set_running(context, false);
        context::restore_current(previous);
    }

    fn set_running(&self, context: ContextId, running: bool) {
        if let Some(stack) = self.inner.stacks.lock().get_mut(&context) {
            stack.running = running;
        }
    }
}

impl Default for Instrumentation {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Instrumentation {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("contexts", &self.inner.stacks.lock().len())
            .field("hooks", &self.inner.hooks.load().len())
            .finish_non_exhaustive()
    }
}

impl ContextStack {
    fn new() -> Self {
        Self {
            frames: Vec::new(),
            running: true,
        }
    }
}

/// A frame on a context's call stack, left when dropped.
///
/// Created by [`Instrumentation::enter()`].
#[derive(Debug)]
#[must_use = "the frame is left as soon as the guard is dropped"]
pub struct Frame<'a> {
    instrumentation: &'a Instrumentation,
    location: CodeLocation,
}

impl Frame<'_> {
    /// The location this frame entered.
    #[must_use]
    pub fn location(&self) -> CodeLocation {
        self.location
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        self.instrumentation.notify_leave(self.location);
    }
}

/// The point below which a profiler records call stacks.
///
/// On the context it was captured on, only frames entered deeper than the capture point
/// are recorded. Other contexts are recorded from the bottom of their stacks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TopFrame {
    context: ContextId,
    depth: usize,
}

impl TopFrame {
    /// Creates a top frame at an explicit position.
    ///
    /// Prefer [`Instrumentation::top_frame()`], which captures the caller's position.
    #[must_use]
    pub fn new(context: ContextId, depth: usize) -> Self {
        Self { context, depth }
    }

    /// The context the top frame was captured on.
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// The number of frames above the recorded region on [`context()`][Self::context].
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The index of the first recorded frame in the stack of `context`.
    pub(crate) fn first_recorded(&self, context: ContextId) -> usize {
        if context == self.context {
            self.depth
        } else {
            0
        }
    }

    /// The part of `stack` that lies below this top frame.
    pub(crate) fn recorded<'s>(&self, context: ContextId, stack: &'s [CodeLocation]) -> &'s [CodeLocation] {
        stack.get(self.first_recorded(context)..).unwrap_or_default()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::location;

    assert_impl_all!(Instrumentation: Send, Sync, Clone);
    assert_impl_all!(Frame<'static>: Send);

    #[derive(Default)]
    struct RecordingHook {
        events: Mutex<Vec<String>>,
    }

    impl EventHook for RecordingHook {
        fn on_enter(&self, event: &FrameEvent) {
            self.events
                .lock()
                .push(format!("enter {} @{}", event.location.function(), event.depth));
        }

        fn on_leave(&self, event: &FrameEvent) {
            let unmatched = if event.matched { "" } else { " unmatched" };

            self.events.lock().push(format!(
                "leave {} @{}{unmatched}",
                event.location.function(),
                event.depth
            ));
        }

        fn on_swap_in(&self, _context: ContextId) {
            self.events.lock().push("swap in".to_string());
        }

        fn on_swap_out(&self, _context: ContextId) {
            self.events.lock().push("swap out".to_string());
        }
    }

    #[test]
    fn frames_push_and_pop() {
        let instrumentation = Instrumentation::new();
        let context = ContextId::current();

        {
            let outer = instrumentation.enter(location!("outer"));
            let _inner = instrumentation.enter(location!("inner"));

            let stack = instrumentation.stack_of(context);
            assert_eq!(stack.len(), 2);
            assert_eq!(stack.first().unwrap().function(), "outer");
            assert_eq!(stack.last().unwrap().function(), "inner");
            assert_eq!(outer.location().function(), "outer");
        }

        assert!(instrumentation.stack_of(context).is_empty());
    }

    #[test]
    fn hooks_receive_events_with_depth() {
        let instrumentation = Instrumentation::new();
        let hook = Arc::new(RecordingHook::default());
        instrumentation.install(Arc::clone(&hook) as Arc<dyn EventHook>);

        {
            let _outer = instrumentation.enter(location!("outer"));
            let _inner = instrumentation.enter(location!("inner"));
        }

        assert_eq!(
            *hook.events.lock(),
            vec![
                "enter outer @0",
                "enter inner @1",
                "leave inner @1",
                "leave outer @0",
            ]
        );
    }

    #[test]
    fn uninstalled_hook_receives_nothing() {
        let instrumentation = Instrumentation::new();
        let hook = Arc::new(RecordingHook::default());
        let installed: Arc<dyn EventHook> = Arc::clone(&hook) as Arc<dyn EventHook>;
        instrumentation.install(Arc::clone(&installed));

        assert!(instrumentation.uninstall(&installed));
        assert!(!instrumentation.uninstall(&installed));

        drop(instrumentation.enter(location!("ignored")));

        assert!(hook.events.lock().is_empty());
    }

    #[test]
    fn unmatched_leave_is_delivered_without_popping() {
        let instrumentation = Instrumentation::new();
        let hook = Arc::new(RecordingHook::default());
        instrumentation.install(Arc::clone(&hook) as Arc<dyn EventHook>);

        let _outer = instrumentation.enter(location!("outer"));
        instrumentation.notify_leave(location!("stray"));

        assert_eq!(instrumentation.stack_of(ContextId::current()).len(), 1);
        assert_eq!(hook.events.lock().last().unwrap(), "leave stray @1 unmatched");
    }

    #[test]
    fn threads_have_separate_stacks() {
        let instrumentation = Instrumentation::new();
        let _frame = instrumentation.enter(location!("main_work"));

        let other = instrumentation.clone();
        let other_stack = thread::spawn(move || {
            let _frame = other.enter(location!("worker"));
            other.stack_of(ContextId::current())
        })
        .join()
        .unwrap();

        assert_eq!(other_stack.len(), 1);
        assert_eq!(other_stack.first().unwrap().function(), "worker");
        assert_eq!(instrumentation.stack_of(ContextId::current()).len(), 1);
    }

    #[test]
    fn swapped_out_context_is_not_running() {
        let instrumentation = Instrumentation::new();
        let cooperative = ContextId::new_cooperative();
        let task_body = location!("task_body");

        instrumentation.notify_swap_in(cooperative);
        assert_eq!(ContextId::current(), cooperative);
        instrumentation.notify_enter(task_body);
        instrumentation.notify_swap_out(cooperative);

        let mut running = Vec::new();
        assert!(instrumentation.try_for_each_running(|context, _| running.push(context)));
        assert!(!running.contains(&cooperative));

        instrumentation.notify_swap_in(cooperative);
        let mut running = Vec::new();
        assert!(instrumentation.try_for_each_running(|context, _| running.push(context)));
        assert!(running.contains(&cooperative));

        instrumentation.notify_leave(task_body);
        instrumentation.notify_swap_out(cooperative);
        assert_eq!(ContextId::current(), ContextId::current_thread());
        assert!(instrumentation.stack_of(cooperative).is_empty());
    }

    #[test]
    fn contended_stacks_are_not_visited() {
        let instrumentation = Instrumentation::new();
        let _frame = instrumentation.enter(location!("work"));

        let _held = instrumentation.inner.stacks.lock();
        let mut visited = 0_usize;

        assert!(!instrumentation.try_for_each_running(|_, _| visited += 1));
        assert_eq!(visited, 0);
    }

    #[test]
    fn swap_notifications_reach_hooks() {
        let instrumentation = Instrumentation::new();
        let hook = Arc::new(RecordingHook::default());
        instrumentation.install(Arc::clone(&hook) as Arc<dyn EventHook>);

        let cooperative = ContextId::new_cooperative();
        instrumentation.notify_swap_in(cooperative);
        instrumentation.notify_swap_out(cooperative);

        assert_eq!(*hook.events.lock(), vec!["swap in", "swap out"]);
    }

    #[test]
    fn top_frame_captures_depth() {
        let instrumentation = Instrumentation::new();
        let _outer = instrumentation.enter(location!("outer"));

        let top = instrumentation.top_frame();
        assert_eq!(top.context(), ContextId::current());
        assert_eq!(top.depth(), 1);

        let stack = [location!("outer"), location!("inner")];
        assert_eq!(top.recorded(top.context(), &stack).len(), 1);
        assert_eq!(top.recorded(ContextId::new_cooperative(), &stack).len(), 2);
        assert!(TopFrame::new(top.context(), 5).recorded(top.context(), &stack).is_empty());
    }
}
