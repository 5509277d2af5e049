//! Common error types for FieldSync.

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for FieldSync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Persistence substrate read or write failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No connectivity; detected before any remote call.
    #[error("No network connection")]
    NetworkUnavailable,

    /// Transport-level failure talking to the remote.
    #[error("Network error: {0}")]
    Network(String),

    /// The remote accepted the request but refused the batch.
    #[error("Remote rejected batch: {0}")]
    RemoteRejected(String),

    /// The remote did not answer in time.
    #[error("Remote push timed out after {0:?}")]
    Timeout(Duration),

    /// Another sync cycle holds the in-flight flag.
    #[error("Sync already in progress")]
    SyncInProgress,

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
