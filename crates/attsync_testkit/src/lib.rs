//! # attsync testkit
//!
//! Test utilities for attsync.
//!
//! This crate provides:
//! - Fact fixtures and temporary fact files
//! - A fact store that fails on demand
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use attsync_testkit::prelude::*;
//!
//! let store = FailingStore::new(MemoryFactStore::with_facts([fact("f1", "x", "y")]));
//! store.fail_put_for(["f2"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod failing;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::failing::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use attsync_core::{Fact, FactBuilder, FactStore, MemoryFactStore};
}

pub use failing::*;
pub use fixtures::*;
pub use generators::*;
