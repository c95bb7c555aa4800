//! Error types for the shutdown sequence.

use crate::callback::CallbackError;
use thiserror::Error;

/// Error returned by [`crate::Coordinator::wait`] or attributed to a single
/// callback inside the sequence.
///
/// `ForceShutdown` and `TimeoutExceeded` are the two sentinels the process
/// orchestrator is expected to match on; everything else is a per-callback
/// failure carried out of the sequence (first one wins).
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// A second termination signal arrived while cleanup was in progress.
    #[error("force shutdown requested")]
    ForceShutdown,

    /// A callback or the overall wait exceeded its time budget.
    #[error("shutdown timeout exceeded")]
    TimeoutExceeded,

    /// Contract violation: the callback was registered without a name.
    #[error("shutdown callback has no name")]
    UnnamedCallback,

    /// Contract violation: the callback was registered without an action.
    #[error("shutdown callback '{name}' has no action")]
    MissingAction { name: String },

    /// The callback's action panicked.
    #[error("shutdown callback '{name}' panicked")]
    CallbackPanicked { name: String },

    /// The callback's action returned an error.
    #[error("shutdown callback '{name}' failed: {source}")]
    Callback {
        name: String,
        #[source]
        source: CallbackError,
    },
}

impl ShutdownError {
    /// True for the timeout sentinel, whether per-callback or overall.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ShutdownError::TimeoutExceeded)
    }

    /// True for the forced-escalation sentinel.
    pub fn is_force_shutdown(&self) -> bool {
        matches!(self, ShutdownError::ForceShutdown)
    }
}
