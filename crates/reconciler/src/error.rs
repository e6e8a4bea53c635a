//! Error types for the reconciler crate.

use std::fmt;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone)]
pub enum Error {
    /// The workload supervisor cannot be reached.
    SupervisorUnavailable { reason: String },
    /// A supervisor call was rejected or failed.
    SupervisorFailed { reason: String },
    /// A remote document could not be downloaded.
    FetchFailed { url: String, reason: String },
    /// Local bootstrap state could not be read or written.
    StateFailed { reason: String },
    /// The export mutation did not complete.
    ExportFailed { reason: String },
    /// A status could not be published.
    StatusFailed { reason: String },
    /// Invalid configuration.
    InvalidConfig { reason: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SupervisorUnavailable { reason } => {
                write!(f, "supervisor unavailable: {reason}")
            }
            Self::SupervisorFailed { reason } => {
                write!(f, "supervisor call failed: {reason}")
            }
            Self::FetchFailed { url, reason } => {
                write!(f, "failed to fetch '{url}': {reason}")
            }
            Self::StateFailed { reason } => {
                write!(f, "bootstrap state error: {reason}")
            }
            Self::ExportFailed { reason } => {
                write!(f, "export failed: {reason}")
            }
            Self::StatusFailed { reason } => {
                write!(f, "failed to set status: {reason}")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<dgraph_pebble::Error> for Error {
    fn from(err: dgraph_pebble::Error) -> Self {
        if err.is_connection_error() {
            Self::SupervisorUnavailable {
                reason: err.to_string(),
            }
        } else {
            Self::SupervisorFailed {
                reason: err.to_string(),
            }
        }
    }
}

impl From<dgraph_core::Error> for Error {
    fn from(err: dgraph_core::Error) -> Self {
        Self::state_failed(err.to_string())
    }
}

impl Error {
    /// Create a fetch failed error.
    pub fn fetch_failed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a state failed error.
    pub fn state_failed(reason: impl Into<String>) -> Self {
        Self::StateFailed {
            reason: reason.into(),
        }
    }

    /// Create an export failed error.
    pub fn export_failed(reason: impl Into<String>) -> Self {
        Self::ExportFailed {
            reason: reason.into(),
        }
    }

    /// Create a status failed error.
    pub fn status_failed(reason: impl Into<String>) -> Self {
        Self::StatusFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether the error means the workload supervisor is unreachable.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::SupervisorUnavailable { .. })
    }
}
