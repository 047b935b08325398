//! # attsync engine
//!
//! Symmetric anti-entropy synchronization of attestation facts.
//!
//! This crate provides:
//! - Transports: WebSocket (`WsTransport`/`WsConnector`) and in-process
//!   (`MemoryTransport`, `LoopbackConnector`)
//! - `Replica`, a fact store paired with its content index and cycle flag
//! - The five-phase reconciliation session (`run_session`, `respond`)
//! - `SyncEngine`, the orchestrator with periodic, connectivity and explicit
//!   triggers
//! - Post-sync embedding backfill
//!
//! ## Architecture
//!
//! Two replicas compare root digests, then group digests, then transfer the
//! facts of every group whose digests disagree. Each side computes its own
//! needs, so one cycle moves facts in both directions:
//!
//! ```text
//! hello → group_hashes → need → attestations → done
//! ```
//!
//! ## Key Invariants
//!
//! - At most one cycle touches a replica at a time
//! - Every phase accepts exactly one message kind
//! - The transport is closed on every exit path
//! - A fact the store rejects is skipped, never fatal
//! - No session state survives a cycle

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backfill;
mod config;
mod engine;
mod error;
mod loopback;
mod replica;
mod session;
mod transport;
mod ws;

pub use backfill::{
    BackfillReport, EmbeddingBackfill, EmbeddingService, EmbeddingStore, HttpEmbeddingService,
    MemoryEmbeddingStore, SourceEmbedding, StoredEmbedding,
};
pub use config::{
    SyncConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_EMBEDDING_BATCH_SIZE, DEFAULT_RECV_TIMEOUT,
};
pub use engine::{Connectivity, SyncCycleResult, SyncEngine, SyncState, SyncStats, TriggerHandle};
pub use error::{SyncError, SyncResult};
pub use loopback::LoopbackConnector;
pub use replica::{CycleGuard, Replica, ReplicaStatus};
pub use session::{
    reconcile, respond, run_session, run_session_as, SessionOutcome, SessionReport,
};
pub use transport::{Connector, MemoryTransport, SyncTransport};
pub use ws::{WsConnector, WsTransport};
