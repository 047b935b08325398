//! Error types for attsync core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The fact store rejected or failed an operation.
    #[error("store error: {message}")]
    Store {
        /// Description of the failure.
        message: String,
    },

    /// A fact is structurally invalid.
    #[error("invalid fact {id:?}: {reason}")]
    InvalidFact {
        /// The offending fact identifier.
        id: String,
        /// Why the fact was rejected.
        reason: String,
    },

    /// A hex digest could not be parsed.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Creates an invalid fact error.
    pub fn invalid_fact(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFact {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
