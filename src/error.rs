//! Error types for the operator binary.

use thiserror::Error;

/// Result type alias for operator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types.
#[derive(Debug, Error)]
pub enum Error {
    /// A Juju hook tool could not be run or exited non-zero.
    #[error("{tool} failed: {reason}")]
    HookToolFailed { tool: String, reason: String },

    /// `JUJU_DISPATCH_PATH` is not set.
    #[error("no dispatch path; is this running inside a Juju hook?")]
    MissingDispatchPath,

    /// Configuration or local state error.
    #[error(transparent)]
    Core(#[from] dgraph_core::Error),

    /// Reconciliation error.
    #[error(transparent)]
    Reconciler(#[from] dgraph_reconciler::Error),

    /// Pebble client error.
    #[error(transparent)]
    Pebble(#[from] dgraph_pebble::Error),
}

impl Error {
    /// Create a hook tool error.
    pub fn hook_tool_failed(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HookToolFailed {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error means the workload supervisor is unreachable.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Reconciler(e) => e.is_unavailable(),
            Self::Pebble(e) => e.is_connection_error(),
            Self::HookToolFailed { .. } | Self::MissingDispatchPath | Self::Core(_) => false,
        }
    }
}
