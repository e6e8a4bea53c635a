//! Error types for the Pebble crate.

use thiserror::Error;

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the container supervisor.
#[derive(Debug, Error)]
pub enum Error {
    /// The supervisor socket could not be reached.
    #[error("connection failed: {reason}")]
    ConnectionFailed { reason: String },

    /// The supervisor answered with an error envelope.
    #[error("pebble API error {status}: {message}")]
    Api { status: u16, message: String },

    /// An asynchronous change finished with an error.
    #[error("change {change_id} failed: {reason}")]
    ChangeFailed { change_id: String, reason: String },

    /// A one-shot command could not be started or awaited.
    #[error("exec of '{command}' failed: {reason}")]
    ExecFailed { command: String, reason: String },

    /// A one-shot command ran and exited non-zero.
    #[error("'{command}' exited with code {code}: {stderr}")]
    ExecExited {
        command: String,
        code: i32,
        stderr: String,
    },

    /// The response could not be understood.
    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },

    /// A named service is not part of the plan.
    #[error("service '{name}' not found")]
    ServiceNotFound { name: String },

    /// YAML (de)serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a connection failed error.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            reason: reason.into(),
        }
    }

    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a change failed error.
    pub fn change_failed(change_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ChangeFailed {
            change_id: change_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an exec failed error.
    pub fn exec_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    /// Whether the error means the supervisor itself is unreachable.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_is_detected() {
        assert!(Error::connection_failed("no socket").is_connection_error());
        assert!(!Error::api(400, "bad layer").is_connection_error());
    }

    #[test]
    fn test_exec_exited_display() {
        let err = Error::ExecExited {
            command: "dgraph live".to_string(),
            code: 2,
            stderr: "alpha not reachable".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("dgraph live"));
        assert!(message.contains("code 2"));
    }
}
