//! # attsync core
//!
//! Fact model and content index for attsync.
//!
//! This crate provides:
//! - `Fact`, the immutable attestation record, and its content hash
//! - `GroupKey`, the (actor, context) bucket facts are indexed under
//! - `ContentIndex`, the two-level digest tree replicas compare during sync
//! - `FactStore`, the local store contract, with an in-memory implementation
//!
//! This crate performs no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod digest;
mod error;
mod fact;
mod index;
mod store;

pub use digest::{Digest, DIGEST_LEN};
pub use error::{CoreError, CoreResult};
pub use fact::{Fact, FactBuilder};
pub use index::{ContentIndex, GroupDiff, GroupKey, RootDigest};
pub use store::{FactFilter, FactStore, MemoryFactStore};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
