//! Error types for loam-core

use thiserror::Error;

/// Result type alias using loam-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in loam-core operations
///
/// A server-detected write conflict is deliberately *not* represented here;
/// conflicts are normal data carried by [`crate::store::SaveOutcome`].
#[derive(Error, Debug)]
pub enum Error {
    /// Entity absent or not owned by the caller
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input, rejected before or by the server
    #[error("Invalid input: {0}")]
    Validation(String),

    /// No network or no server response; the edit was queued locally
    /// when possible, so callers can use non-alarming messaging
    #[error("Server unreachable: {0}")]
    Unreachable(String),

    /// Remote API reported a failure that is neither a validation
    /// rejection nor a missing entity
    #[error("Remote API error: {0}")]
    Api(String),

    /// Durable local store unavailable; fatal to the offline queue only
    #[error("Local storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<libsql::Error> for Error {
    fn from(error: libsql::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<crate::remote::RemoteError> for Error {
    fn from(error: crate::remote::RemoteError) -> Self {
        use crate::remote::RemoteError;
        match error {
            RemoteError::NotFound(message) => Self::NotFound(message),
            RemoteError::Validation(message) => Self::Validation(message),
            RemoteError::Api { status, message } => Self::Api(format!("{message} ({status})")),
            RemoteError::Unreachable(message) => Self::Unreachable(message),
        }
    }
}
