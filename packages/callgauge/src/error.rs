use std::io;

use thiserror::Error;

use crate::{CodeLocation, ContextId};

/// Errors raised by the profiling engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The platform or runtime lacks a primitive that a clock requires.
    ///
    /// This is not retryable. Choose a different [`Clock`][crate::Clock] instead.
    #[error("capability unsupported on this platform: {capability}")]
    CapabilityUnsupported {
        /// The missing primitive, e.g. a per-thread CPU clock.
        capability: &'static str,
    },

    /// A leave event arrived that does not match the most recent unmatched enter
    /// event of its context.
    ///
    /// The profiling region that observed it is stopped and its incomplete
    /// frames are discarded.
    #[error("stack imbalance in {context}: leave of {location} has no matching enter")]
    StackImbalance {
        /// The context whose event stream was unbalanced.
        context: ContextId,

        /// The location named by the offending leave event.
        location: CodeLocation,
    },

    /// The profiler was asked to start (or was inspected) while it is already active.
    #[error("the profiler is already active")]
    AlreadyActive,

    /// The profiler was asked to stop while it is not active.
    #[error("the profiler is not active")]
    NotActive,

    /// The interval timer that drives sampling could not be started.
    #[error("failed to start the sampling timer")]
    TimerUnavailable(#[source] io::Error),
}

/// A specialized `Result` type for profiling operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
