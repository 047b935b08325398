//! Protocol error types.

use crate::messages::MessageKind;
use crate::phase::Phase;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while encoding or decoding messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// A frame was not a valid message.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    /// A frame named a message type this protocol does not have.
    #[error("unknown message type {0:?}")]
    UnknownType(String),
}

/// A message kind that is not valid in the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{direction} {got} in phase {phase:?} (expected {})", expected_name(.expected))]
pub struct ProtocolViolation {
    /// Phase the machine was in.
    pub phase: Phase,
    /// Kind the phase accepts, if any.
    pub expected: Option<MessageKind>,
    /// Kind that was offered.
    pub got: MessageKind,
    /// Whether the message was being sent or received.
    pub direction: Direction,
}

/// Direction of a message relative to the local replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Outbound message.
    Sent,
    /// Inbound message.
    Received,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Sent => f.write_str("sent"),
            Direction::Received => f.write_str("received"),
        }
    }
}

fn expected_name(expected: &Option<MessageKind>) -> &'static str {
    expected.map(|k| k.as_str()).unwrap_or("nothing")
}
