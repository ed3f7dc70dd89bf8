//! Error types for loam-server

use thiserror::Error;

/// Result type alias using loam-server's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in server-side note operations
#[derive(Error, Debug)]
pub enum Error {
    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Note absent or not owned by the caller
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
