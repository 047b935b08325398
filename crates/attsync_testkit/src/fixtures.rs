//! Fact fixtures and temporary fact files.

use attsync_core::{Fact, FactBuilder};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Timestamp used by fixtures (2023-11-14T22:13:20Z).
pub const FIXTURE_TIMESTAMP: i64 = 1_700_000_000_000;

/// A fact with one actor and one context.
///
/// The subject is the id, so facts with different ids never share content.
pub fn fact(id: &str, actor: &str, context: &str) -> Fact {
    FactBuilder::new()
        .id(id)
        .subject(id)
        .predicate("attests")
        .actor(actor)
        .context(context)
        .timestamp(FIXTURE_TIMESTAMP)
        .source("testkit")
        .build()
}

/// A fact with several actors and contexts.
pub fn fact_in(id: &str, actors: &[&str], contexts: &[&str]) -> Fact {
    FactBuilder::new()
        .id(id)
        .subject(id)
        .predicate("attests")
        .actors(actors.iter().copied())
        .contexts(contexts.iter().copied())
        .timestamp(FIXTURE_TIMESTAMP)
        .source("testkit")
        .build()
}

/// `count` facts spread over `groups` contexts under one actor.
pub fn fact_batch(prefix: &str, count: usize, groups: usize) -> Vec<Fact> {
    let groups = groups.max(1);
    (0..count)
        .map(|i| fact(&format!("{prefix}-{i}"), "actor", &format!("ctx-{}", i % groups)))
        .collect()
}

/// Sorted ids of a fact list.
pub fn ids_of(facts: &[Fact]) -> Vec<String> {
    let mut ids: Vec<String> = facts.iter().map(|f| f.id.clone()).collect();
    ids.sort();
    ids
}

/// A JSON fact file in a temporary directory, removed on drop.
pub struct TempFactFile {
    path: PathBuf,
    _dir: TempDir,
}

impl TempFactFile {
    /// Creates an empty directory; the file itself does not exist yet.
    pub fn empty() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            path: dir.path().join("facts.json"),
            _dir: dir,
        }
    }

    /// Creates a file holding `facts` as a JSON array.
    pub fn with_facts(facts: &[Fact]) -> Self {
        let file = Self::empty();
        let json = serde_json::to_string_pretty(facts).expect("Failed to encode facts");
        std::fs::write(&file.path, json).expect("Failed to write fact file");
        file
    }

    /// Path of the fact file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the facts back.
    pub fn read(&self) -> Vec<Fact> {
        let json = std::fs::read_to_string(&self.path).expect("Failed to read fact file");
        serde_json::from_str(&json).expect("Failed to decode fact file")
    }
}
