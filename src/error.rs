//! Error types for the model registry core

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the registry, cache, scanner and download manager
#[derive(Debug, Error)]
pub enum ModelError {
    /// A directory, descriptor or model that was expected is absent
    #[error("not found: {0}")]
    NotFound(String),

    /// A descriptor or cached record could not be decoded
    #[error("corrupt data at {path:?}: {reason}")]
    CorruptData { path: PathBuf, reason: String },

    /// Contention or a short-lived failure worth retrying
    #[error("transient failure: {0}")]
    Transient(String),

    /// The remote registry could not be reached or is failing server-side
    #[error("remote registry unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote registry rejected a request
    #[error("remote registry returned {status}: {message}")]
    Remote { status: u16, message: String },

    /// The key-value store failed in a way that will not resolve by retrying
    #[error("cache store error: {0}")]
    Storage(String),

    /// Retry budget spent on a transient failure
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<ModelError>,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    /// Whether the operation that produced this error may succeed if repeated
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Whether this error means the resource simply is not there
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
