//! # attsync protocol
//!
//! Wire messages and phase state machine for attsync reconciliation.
//!
//! This crate provides:
//! - `SyncMessage`, the five JSON message kinds exchanged in strict order
//! - `Phase`, the explicit state machine deciding which kinds are valid when
//! - `ProtocolViolation`, raised for any out-of-order message
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod phase;

pub use error::{Direction, ProtocolError, ProtocolResult, ProtocolViolation};
pub use messages::{Attestations, Done, GroupHashes, Hello, MessageKind, Need, SyncMessage};
pub use phase::Phase;
