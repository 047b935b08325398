//! Error types for the sync engine.

use attsync_protocol::{ProtocolError, ProtocolViolation};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a reconciliation cycle.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The connection handshake did not complete in time.
    #[error("connect timed out")]
    ConnectTimeout,

    /// No message arrived within the receive bound.
    #[error("receive timed out")]
    RecvTimeout,

    /// The peer went away before the expected message arrived.
    #[error("channel closed")]
    ChannelClosed,

    /// Unexpected message kind for the current phase.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A received fact could not be persisted. Logged and skipped.
    #[error("failed to store fact {fact_id}: {message}")]
    StoreFailure {
        /// Fact identifier.
        fact_id: String,
        /// Underlying store error.
        message: String,
    },

    /// One embedding batch could not be fetched. Logged and skipped.
    #[error("embedding fetch failed: {message}")]
    EmbeddingFetchFailure {
        /// Error message.
        message: String,
    },

    /// Network or transport error.
    #[error("transport error: {0}")]
    Transport(String),

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Local store or index error.
    #[error("store error: {0}")]
    Store(#[from] attsync_core::CoreError),
}

impl SyncError {
    /// Creates an embedding fetch failure.
    pub fn embedding_fetch(message: impl Into<String>) -> Self {
        Self::EmbeddingFetchFailure {
            message: message.into(),
        }
    }

    /// Returns true if the error means the connection is unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectTimeout
                | SyncError::RecvTimeout
                | SyncError::ChannelClosed
                | SyncError::Transport(_)
        )
    }
}

impl From<ProtocolViolation> for SyncError {
    fn from(err: ProtocolViolation) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnknownType(_) => SyncError::Protocol(err.to_string()),
            ProtocolError::Encode(_) | ProtocolError::Decode(_) => SyncError::Codec(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attsync_protocol::{Direction, MessageKind, Phase};

    #[test]
    fn connection_errors() {
        assert!(SyncError::ConnectTimeout.is_connection_error());
        assert!(SyncError::RecvTimeout.is_connection_error());
        assert!(SyncError::ChannelClosed.is_connection_error());
        assert!(SyncError::Transport("reset".into()).is_connection_error());
        assert!(!SyncError::Protocol("bad".into()).is_connection_error());
        assert!(!SyncError::embedding_fetch("503").is_connection_error());
    }

    #[test]
    fn violation_becomes_protocol_error() {
        let err: SyncError = ProtocolViolation {
            phase: Phase::Diverged,
            expected: Some(MessageKind::GroupHashes),
            got: MessageKind::Done,
            direction: Direction::Received,
        }
        .into();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert!(err.to_string().contains("expected group_hashes"));
    }

    #[test]
    fn unknown_message_type_is_a_protocol_error() {
        let err: SyncError = attsync_protocol::SyncMessage::decode(r#"{"type":"sync_status"}"#)
            .unwrap_err()
            .into();
        assert!(matches!(err, SyncError::Protocol(_)));

        let err: SyncError = attsync_protocol::SyncMessage::decode("{").unwrap_err().into();
        assert!(matches!(err, SyncError::Codec(_)));
    }

    #[test]
    fn error_display() {
        let err = SyncError::StoreFailure {
            fact_id: "AS-1".into(),
            message: "disk full".into(),
        };
        assert_eq!(err.to_string(), "failed to store fact AS-1: disk full");
        assert_eq!(SyncError::RecvTimeout.to_string(), "receive timed out");
    }
}
