//! Periodic capture of running call stacks into a stat tree.

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::{CodeLocation, Instrumentation, StatTree, TopFrame};

// Sized for typical stack depths and context counts; grows if ever exceeded.
const INITIAL_FRAME_CAPACITY: usize = 1024;
const INITIAL_PATH_CAPACITY: usize = 64;

/// The capture engine behind [`SamplingProfiler`][crate::SamplingProfiler].
///
/// Cloning produces another handle to the same sampler, which is how the timer callback
/// reaches it.
#[derive(Clone, Debug)]
pub(crate) struct Sampler {
    shared: Arc<SamplerShared>,
}

#[derive(Debug)]
struct SamplerShared {
    instrumentation: Instrumentation,
    top_frame: TopFrame,
    active: AtomicBool,
    tree: Mutex<StatTree>,

    // Only used by the tick that is currently sampling. Reused to avoid allocating
    // on the sampling path.
    buffer: Mutex<CaptureBuffer>,
}

/// Running stacks copied out of the instrumentation, one span of `frames` per path.
#[derive(Debug)]
struct CaptureBuffer {
    frames: Vec<CodeLocation>,
    paths: Vec<Range<usize>>,
}

impl Sampler {
    pub(crate) fn new(instrumentation: Instrumentation, top_frame: TopFrame) -> Self {
        Self {
            shared: Arc::new(SamplerShared {
                instrumentation,
                top_frame,
                active: AtomicBool::new(false),
                tree: Mutex::new(StatTree::new()),
                buffer: Mutex::new(CaptureBuffer {
                    frames: Vec::with_capacity(INITIAL_FRAME_CAPACITY),
                    paths: Vec::with_capacity(INITIAL_PATH_CAPACITY),
                }),
            }),
        }
    }

    pub(crate) fn top_frame(&self) -> TopFrame {
        self.shared.top_frame
    }

    /// Starts accepting samples.
    pub(crate) fn activate(&self) {
        self.shared.active.store(true, Ordering::Release);
    }

    /// Stops accepting samples. Ticks that arrive afterwards are discarded.
    pub(crate) fn deactivate(&self) {
        self.shared.active.store(false, Ordering::Release);
    }

    /// Captures the running stacks of every context and credits them to the tree.
    ///
    /// The sample is dropped if the sampler is inactive, if the stacks are being
    /// modified at this very moment or if the capture fails.
    pub(crate) fn sample(&self) {
        if !self.shared.active.load(Ordering::Acquire) {
            return;
        }

        let mut buffer = self.shared.buffer.lock();
        let CaptureBuffer { frames, paths } = &mut *buffer;
        frames.clear();
        paths.clear();

        let top_frame = self.shared.top_frame;

        let captured = panic::catch_unwind(AssertUnwindSafe(|| {
            self.shared
                .instrumentation
                .try_for_each_running(|context, stack| {
                    let recorded = top_frame.recorded(context, stack);

                    if recorded.is_empty() {
                        return;
                    }

                    let start = frames.len();
                    frames.extend_from_slice(recorded);
                    paths.push(start..frames.len());
                })
        }));

        match captured {
            Ok(true) => {}
            Ok(false) => {
                trace!("call stacks are busy; sample dropped");
                return;
            }
            Err(_) => {
                trace!("call stack capture failed; sample dropped");
                return;
            }
        }

        let mut tree = self.shared.tree.lock();

        for path in &*paths {
            if let Some(path) = frames.get(path.clone()) {
                tree.record_sample(path);
            }
        }
    }

    pub(crate) fn snapshot(&self) -> StatTree {
        self.shared.tree.lock().clone()
    }

    pub(crate) fn reset(&self) {
        *self.shared.tree.lock() = StatTree::new();
    }
}
