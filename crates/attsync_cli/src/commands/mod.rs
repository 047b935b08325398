//! CLI command implementations.

pub mod embeddings;
pub mod facts;
pub mod serve;
pub mod status;
pub mod sync;
