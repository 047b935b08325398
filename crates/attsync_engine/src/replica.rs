//! A local replica: fact store, content index and cycle flag.

use crate::error::SyncResult;
use attsync_core::{ContentIndex, Digest, Fact, FactStore, RootDigest};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// One replica taking part in reconciliation.
///
/// The index is kept in step with the store: every fact that is persisted
/// through the replica is indexed under all of its group keys. At most one
/// reconciliation cycle runs against a replica at a time; see
/// [`try_begin_cycle`](Self::try_begin_cycle).
pub struct Replica<S> {
    name: String,
    store: S,
    index: RwLock<ContentIndex>,
    cycle_active: AtomicBool,
}

/// Point-in-time summary of a replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicaStatus {
    /// Replica name.
    pub name: String,
    /// Root digest of the index.
    pub root_hash: Digest,
    /// Number of groups.
    pub group_count: usize,
    /// Number of facts in the store.
    pub fact_count: usize,
    /// Whether a cycle is running.
    pub syncing: bool,
    /// Group encoding -> group digest.
    pub groups: BTreeMap<String, Digest>,
}

impl<S: FactStore> Replica<S> {
    /// Opens a replica over a store, indexing every fact it already holds.
    pub fn open(name: impl Into<String>, store: S) -> SyncResult<Self> {
        let name = name.into();
        let mut index = ContentIndex::new();
        let ids = store.list_fact_ids()?;
        for id in &ids {
            if let Some(fact) = store.get_fact(id)? {
                index.index_fact(&fact);
            }
        }
        info!(
            replica = %name,
            facts = ids.len(),
            groups = index.group_count(),
            "replica opened"
        );

        Ok(Self {
            name,
            store,
            index: RwLock::new(index),
            cycle_active: AtomicBool::new(false),
        })
    }

    /// Replica name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persists and indexes a fact.
    ///
    /// Returns false if a fact with the same id was already stored; the
    /// index is left untouched in that case.
    pub fn ingest(&self, fact: &Fact) -> SyncResult<bool> {
        if self.store.contains_fact(&fact.id)? {
            return Ok(false);
        }
        self.store.put_fact(fact)?;
        let content_hash = self.index.write().index_fact(fact);
        debug!(replica = %self.name, id = %fact.id, hash = %content_hash.short(), "fact ingested");
        Ok(true)
    }

    /// Returns true if a fact with this content is already indexed.
    pub fn has_content(&self, content_hash: &Digest) -> bool {
        self.index.read().contains(content_hash)
    }

    /// Current root digest.
    pub fn root(&self) -> RootDigest {
        self.index.read().root()
    }

    /// Current group digests.
    pub fn group_digests(&self) -> BTreeMap<String, Digest> {
        self.index.read().group_digests()
    }

    /// Runs `f` with shared access to the index.
    pub fn with_index<R>(&self, f: impl FnOnce(&ContentIndex) -> R) -> R {
        f(&self.index.read())
    }

    /// Claims the replica for one cycle.
    ///
    /// Returns `None` without waiting if a cycle is already running.
    pub fn try_begin_cycle(&self) -> Option<CycleGuard<'_>> {
        self.cycle_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard {
                flag: &self.cycle_active,
            })
    }

    /// Returns true while a cycle holds the replica.
    pub fn is_cycle_active(&self) -> bool {
        self.cycle_active.load(Ordering::Acquire)
    }

    /// Summarises the replica.
    pub fn status(&self) -> SyncResult<ReplicaStatus> {
        let fact_count = self.store.list_fact_ids()?.len();
        let index = self.index.read();
        let root = index.root();
        Ok(ReplicaStatus {
            name: self.name.clone(),
            root_hash: root.digest,
            group_count: root.group_count,
            fact_count,
            syncing: self.is_cycle_active(),
            groups: index.group_digests(),
        })
    }
}

impl<S> std::fmt::Debug for Replica<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("name", &self.name)
            .field("index", &*self.index.read())
            .field("cycle_active", &self.cycle_active.load(Ordering::Relaxed))
            .finish()
    }
}

/// Releases the cycle flag when dropped.
#[derive(Debug)]
pub struct CycleGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attsync_core::{FactBuilder, MemoryFactStore};

    fn fact(id: &str, actor: &str, context: &str) -> Fact {
        FactBuilder::new()
            .id(id)
            .subject("s")
            .predicate("p")
            .actor(actor)
            .context(context)
            .timestamp(1)
            .build()
    }

    #[test]
    fn open_indexes_existing_facts() {
        let store = MemoryFactStore::with_facts([fact("f1", "x", "y"), fact("f2", "x", "z")]);
        let replica = Replica::open("a", store).unwrap();

        assert_eq!(replica.root().group_count, 2);
        let status = replica.status().unwrap();
        assert_eq!(status.fact_count, 2);
        assert_eq!(status.groups.len(), 2);
        assert!(!status.syncing);
    }

    #[test]
    fn ingest_is_idempotent_by_id() {
        let replica = Replica::open("a", MemoryFactStore::new()).unwrap();
        let f1 = fact("f1", "x", "y");

        assert!(replica.ingest(&f1).unwrap());
        let root = replica.root();
        assert!(!replica.ingest(&f1).unwrap());
        assert_eq!(replica.root(), root);
        assert!(replica.has_content(&f1.content_hash()));
    }

    #[test]
    fn ingest_matches_open() {
        let facts = [fact("f1", "x", "y"), fact("f2", "w", "y")];
        let opened = Replica::open("a", MemoryFactStore::with_facts(facts.clone())).unwrap();

        let ingested = Replica::open("b", MemoryFactStore::new()).unwrap();
        for f in &facts {
            ingested.ingest(f).unwrap();
        }
        assert_eq!(opened.root(), ingested.root());
    }

    #[test]
    fn cycle_guard_is_exclusive() {
        let replica = Replica::open("a", MemoryFactStore::new()).unwrap();

        let guard = replica.try_begin_cycle().unwrap();
        assert!(replica.is_cycle_active());
        assert!(replica.try_begin_cycle().is_none());

        drop(guard);
        assert!(!replica.is_cycle_active());
        assert!(replica.try_begin_cycle().is_some());
    }
}
