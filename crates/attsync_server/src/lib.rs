//! # attsync Sync Server
//!
//! Accepts WebSocket connections from peers and answers each with one
//! reconciliation cycle against a local replica.
//!
//! This crate provides:
//! - `SyncServer`, the accept loop
//! - `ServerConfig`, bind address and timeouts
//! - Replica status reporting
//!
//! # Protocol
//!
//! The connecting peer drives the cycle; the server runs the same session
//! as the responder:
//! 1. Both sides send `hello` and compare root digests
//! 2. On mismatch both sides exchange group digests and needs
//! 3. Facts for every diverged group cross in both directions
//! 4. Both sides send `done` and the connection is closed
//!
//! A peer that connects while the replica is already in a cycle is
//! disconnected without a `hello`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod server;

pub use config::{ServerConfig, DEFAULT_BIND_ADDR};
pub use error::{ServerError, ServerResult};
pub use server::{ServerStats, SyncServer};
