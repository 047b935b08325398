//! The attestation fact model and its content hash.

use crate::digest::Digest;
use crate::index::GroupKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::BTreeMap;

/// An immutable attestation.
///
/// Facts are created by ingestion, stored once and never mutated. Two facts
/// that make the same claim share a [`content_hash`](Fact::content_hash) even
/// when their identifiers differ.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Fact {
    /// Storage identifier (for example `AS-<uuid>`).
    pub id: String,
    /// Entities being attested about.
    #[serde(default)]
    pub subjects: Vec<String>,
    /// What is being claimed.
    #[serde(default)]
    pub predicates: Vec<String>,
    /// Contexts for the claim.
    #[serde(default)]
    pub contexts: Vec<String>,
    /// Who made the claim.
    #[serde(default)]
    pub actors: Vec<String>,
    /// When the claim was made (Unix milliseconds).
    #[serde(default)]
    pub timestamp: i64,
    /// How the fact was created (`cli`, `api`, ...).
    #[serde(default)]
    pub source: String,
    /// Free-form metadata. Not part of the content hash.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Fact {
    /// Computes the deterministic content hash.
    ///
    /// Covers subjects, predicates, contexts, actors (each sorted), timestamp
    /// and source. `id` and `attributes` are excluded.
    pub fn content_hash(&self) -> Digest {
        let mut h = Sha256::new();
        h.update(b"s:");
        h.update(canonical(&self.subjects).as_bytes());
        h.update(b"\np:");
        h.update(canonical(&self.predicates).as_bytes());
        h.update(b"\nc:");
        h.update(canonical(&self.contexts).as_bytes());
        h.update(b"\na:");
        h.update(canonical(&self.actors).as_bytes());
        h.update(b"\nt:");
        h.update(self.timestamp.to_be_bytes());
        h.update(b"\nrc:");
        h.update(self.source.as_bytes());
        Digest::from_bytes(h.finalize().into())
    }

    /// Returns every group key this fact belongs to.
    ///
    /// The Cartesian product of actors and contexts; an empty dimension is
    /// replaced by the empty-string placeholder, so the result is never empty.
    pub fn group_keys(&self) -> Vec<GroupKey> {
        let placeholder = [String::new()];
        let actors: &[String] = if self.actors.is_empty() {
            &placeholder
        } else {
            &self.actors
        };
        let contexts: &[String] = if self.contexts.is_empty() {
            &placeholder
        } else {
            &self.contexts
        };

        let mut keys = Vec::with_capacity(actors.len() * contexts.len());
        for actor in actors {
            for context in contexts {
                let key = GroupKey::new(actor.clone(), context.clone());
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }
}

/// Sort a string slice and join with NUL for deterministic hashing.
fn canonical(ss: &[String]) -> String {
    let mut sorted: Vec<&str> = ss.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join("\0")
}

/// Fluent constructor for [`Fact`].
#[derive(Debug, Default, Clone)]
pub struct FactBuilder {
    fact: Fact,
}

impl FactBuilder {
    /// Starts an empty fact.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the identifier.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.fact.id = id.into();
        self
    }

    /// Adds a subject.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.fact.subjects.push(subject.into());
        self
    }

    /// Adds several subjects.
    pub fn subjects(mut self, subjects: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fact
            .subjects
            .extend(subjects.into_iter().map(Into::into));
        self
    }

    /// Adds a predicate.
    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        self.fact.predicates.push(predicate.into());
        self
    }

    /// Adds a context.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.fact.contexts.push(context.into());
        self
    }

    /// Adds several contexts.
    pub fn contexts(mut self, contexts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fact
            .contexts
            .extend(contexts.into_iter().map(Into::into));
        self
    }

    /// Adds an actor.
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.fact.actors.push(actor.into());
        self
    }

    /// Adds several actors.
    pub fn actors(mut self, actors: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fact.actors.extend(actors.into_iter().map(Into::into));
        self
    }

    /// Sets the timestamp (Unix milliseconds).
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.fact.timestamp = timestamp;
        self
    }

    /// Sets the source.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.fact.source = source.into();
        self
    }

    /// Adds an attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fact.attributes.insert(key.into(), value);
        self
    }

    /// Finishes the fact.
    pub fn build(self) -> Fact {
        self.fact
    }
}
