//! Content index: a two-level digest tree over facts.
//!
//! ```text
//! Root
//! └── Group (actor, context)
//!     └── Leaf (fact content hash)
//! ```
//!
//! Replicas compare the root digest first, then the per-group digests, and
//! only transfer the groups whose digests disagree.
//!
//! The root digest is maintained incrementally: every group contributes a
//! term `H("root-entry:" || group key hash || group digest)` to a 256-bit
//! wrapping sum, so an insert touches one group and two accumulator updates
//! instead of rehashing every group.

use crate::digest::Digest;
use crate::fact::Fact;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Identifies one bucket of the index: an (actor, context) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    /// Actor tag, or the empty string when the fact has no actors.
    pub actor: String,
    /// Context tag, or the empty string when the fact has no contexts.
    pub context: String,
}

impl GroupKey {
    /// Creates a group key.
    pub fn new(actor: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            context: context.into(),
        }
    }

    /// Deterministic hash of the key.
    pub fn key_hash(&self) -> Digest {
        let mut h = Sha256::new();
        h.update(b"gk:");
        h.update(self.actor.as_bytes());
        h.update(b"\0");
        h.update(self.context.as_bytes());
        Digest::from_bytes(h.finalize().into())
    }

    /// Stable string encoding used on the wire (hex of [`key_hash`](Self::key_hash)).
    pub fn encoding(&self) -> String {
        self.key_hash().to_hex()
    }
}

/// Summary of the whole index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootDigest {
    /// Root digest; all zeros for an empty index.
    pub digest: Digest,
    /// Number of non-empty groups.
    pub group_count: usize,
}

/// Result of comparing local group digests with a remote peer's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDiff {
    /// Groups only this side has. The peer discovers these through its own diff.
    pub local_only: Vec<String>,
    /// Groups only the peer has.
    pub remote_only: Vec<String>,
    /// Groups both sides have with different contents.
    pub divergent: Vec<String>,
}

impl GroupDiff {
    /// Group encodings this side must request: remote-only followed by divergent.
    pub fn need(&self) -> Vec<String> {
        let mut need = Vec::with_capacity(self.remote_only.len() + self.divergent.len());
        need.extend(self.remote_only.iter().cloned());
        need.extend(self.divergent.iter().cloned());
        need
    }

    /// Returns true when neither side is missing anything.
    pub fn is_empty(&self) -> bool {
        self.local_only.is_empty() && self.remote_only.is_empty() && self.divergent.is_empty()
    }
}

#[derive(Clone)]
struct Group {
    key: GroupKey,
    leaves: BTreeSet<Digest>,
    digest: Digest,
}

impl Group {
    fn new(key: GroupKey) -> Self {
        Self {
            key,
            leaves: BTreeSet::new(),
            digest: Digest::ZERO,
        }
    }

    fn recompute_digest(&mut self) {
        if self.leaves.is_empty() {
            self.digest = Digest::ZERO;
            return;
        }

        let mut h = Sha256::new();
        h.update(b"grp:");
        h.update(self.key.actor.as_bytes());
        h.update(b"\0");
        h.update(self.key.context.as_bytes());
        h.update(b"\0");
        // BTreeSet iterates in sorted order
        for leaf in &self.leaves {
            h.update(leaf.as_bytes());
        }
        self.digest = Digest::from_bytes(h.finalize().into());
    }
}

fn root_term(key_hash: &Digest, group_digest: &Digest) -> Digest {
    let mut h = Sha256::new();
    h.update(b"root-entry:");
    h.update(key_hash.as_bytes());
    h.update(group_digest.as_bytes());
    Digest::from_bytes(h.finalize().into())
}

/// In-memory content index over a replica's facts.
#[derive(Clone, Default)]
pub struct ContentIndex {
    groups: BTreeMap<Digest, Group>,
    accumulator: Digest,
    /// Content hash -> number of groups holding it.
    leaf_refs: HashMap<Digest, usize>,
    size: usize,
}

impl ContentIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from a set of facts.
    pub fn from_facts<'a, I>(facts: I) -> Self
    where
        I: IntoIterator<Item = &'a Fact>,
    {
        let mut index = Self::new();
        for fact in facts {
            index.index_fact(fact);
        }
        index
    }

    /// Inserts a content hash under `(actor, context)`.
    ///
    /// Inserting a hash that is already present is a no-op.
    pub fn insert(&mut self, actor: &str, context: &str, content_hash: Digest) {
        self.insert_key(GroupKey::new(actor, context), content_hash);
    }

    /// Inserts a content hash under a group key.
    pub fn insert_key(&mut self, key: GroupKey, content_hash: Digest) -> bool {
        let key_hash = key.key_hash();
        let group = self
            .groups
            .entry(key_hash)
            .or_insert_with(|| Group::new(key));

        if group.leaves.contains(&content_hash) {
            return false;
        }

        let old_term = (!group.leaves.is_empty()).then(|| root_term(&key_hash, &group.digest));
        group.leaves.insert(content_hash);
        group.recompute_digest();
        let new_term = root_term(&key_hash, &group.digest);

        if let Some(old) = old_term {
            self.accumulator = self.accumulator.wrapping_sub(&old);
        }
        self.accumulator = self.accumulator.wrapping_add(&new_term);
        *self.leaf_refs.entry(content_hash).or_insert(0) += 1;
        self.size += 1;
        true
    }

    /// Indexes a fact under every group key it declares.
    ///
    /// Returns the fact's content hash.
    pub fn index_fact(&mut self, fact: &Fact) -> Digest {
        let content_hash = fact.content_hash();
        for key in fact.group_keys() {
            self.insert_key(key, content_hash);
        }
        content_hash
    }

    /// Removes a content hash from a group. Empty groups are dropped.
    pub fn remove(&mut self, key: &GroupKey, content_hash: &Digest) -> bool {
        let key_hash = key.key_hash();
        let Some(group) = self.groups.get_mut(&key_hash) else {
            return false;
        };
        if !group.leaves.contains(content_hash) {
            return false;
        }

        let old_term = root_term(&key_hash, &group.digest);
        group.leaves.remove(content_hash);
        self.accumulator = self.accumulator.wrapping_sub(&old_term);

        if group.leaves.is_empty() {
            self.groups.remove(&key_hash);
        } else {
            group.recompute_digest();
            self.accumulator = self
                .accumulator
                .wrapping_add(&root_term(&key_hash, &group.digest));
        }

        if let Some(refs) = self.leaf_refs.get_mut(content_hash) {
            *refs -= 1;
            if *refs == 0 {
                self.leaf_refs.remove(content_hash);
            }
        }
        self.size -= 1;
        true
    }

    /// Returns true if the content hash is present in any group.
    pub fn contains(&self, content_hash: &Digest) -> bool {
        self.leaf_refs.contains_key(content_hash)
    }

    /// Returns the root digest and group count.
    pub fn root(&self) -> RootDigest {
        let group_count = self.groups.len();
        if group_count == 0 {
            return RootDigest {
                digest: Digest::ZERO,
                group_count,
            };
        }

        let mut h = Sha256::new();
        h.update(b"root:");
        h.update(self.accumulator.as_bytes());
        h.update((group_count as u64).to_be_bytes());
        RootDigest {
            digest: Digest::from_bytes(h.finalize().into()),
            group_count,
        }
    }

    /// Returns group encoding -> group digest for every group.
    pub fn group_digests(&self) -> BTreeMap<String, Digest> {
        self.groups
            .iter()
            .map(|(key_hash, group)| (key_hash.to_hex(), group.digest))
            .collect()
    }

    /// Compares local group digests with a remote peer's.
    ///
    /// Encodings are compared as exact strings in both directions, so a
    /// remote key that is not in canonical lowercase form is remote-only.
    pub fn diff(&self, remote: &BTreeMap<String, Digest>) -> GroupDiff {
        let mut diff = GroupDiff::default();
        let mut local = BTreeSet::new();

        for (key_hash, group) in &self.groups {
            let encoding = key_hash.to_hex();
            match remote.get(&encoding) {
                None => diff.local_only.push(encoding.clone()),
                Some(remote_digest) if *remote_digest != group.digest => {
                    diff.divergent.push(encoding.clone())
                }
                Some(_) => {}
            }
            local.insert(encoding);
        }

        diff.remote_only = remote
            .keys()
            .filter(|encoding| !local.contains(encoding.as_str()))
            .cloned()
            .collect();

        diff
    }

    /// Reverse-maps a group encoding to its key.
    pub fn find_group_key_by_encoding(&self, encoding: &str) -> Option<&GroupKey> {
        let key_hash = Digest::from_hex(encoding).ok()?;
        self.groups.get(&key_hash).map(|g| &g.key)
    }

    /// Content hashes stored under a group.
    pub fn group_leaves(&self, key: &GroupKey) -> Vec<Digest> {
        self.groups
            .get(&key.key_hash())
            .map(|g| g.leaves.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Total number of (group, content hash) entries.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl std::fmt::Debug for ContentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentIndex")
            .field("groups", &self.groups.len())
            .field("size", &self.size)
            .finish()
    }
}
