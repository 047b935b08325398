//! Error types for the sync server.

use attsync_engine::SyncError;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The WebSocket upgrade failed or timed out.
    #[error("websocket upgrade failed: {0}")]
    Upgrade(String),

    /// A reconciliation cycle failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if the error is confined to one peer connection.
    pub fn is_connection_error(&self) -> bool {
        match self {
            ServerError::Upgrade(_) => true,
            ServerError::Sync(e) => e.is_connection_error(),
            ServerError::Bind { .. } | ServerError::Io(_) => false,
        }
    }
}
