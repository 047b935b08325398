//! Local fact store contract and an in-memory implementation.

use crate::error::{CoreError, CoreResult};
use crate::fact::Fact;
use crate::index::GroupKey;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Filter for [`FactStore::query_facts`].
///
/// Each non-empty dimension must match at least one of the fact's tags. The
/// empty-string tag matches facts that carry no tags in that dimension or an
/// explicit empty tag, mirroring the placeholder used by the content index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactFilter {
    /// Accepted actors (empty = any).
    pub actors: Vec<String>,
    /// Accepted contexts (empty = any).
    pub contexts: Vec<String>,
}

impl FactFilter {
    /// Filter selecting exactly one group.
    pub fn group(key: &GroupKey) -> Self {
        Self {
            actors: vec![key.actor.clone()],
            contexts: vec![key.context.clone()],
        }
    }

    /// Returns true if the fact passes the filter.
    pub fn matches(&self, fact: &Fact) -> bool {
        dimension_matches(&self.actors, &fact.actors)
            && dimension_matches(&self.contexts, &fact.contexts)
    }
}

fn dimension_matches(wanted: &[String], have: &[String]) -> bool {
    if wanted.is_empty() {
        return true;
    }
    wanted.iter().any(|w| {
        if w.is_empty() {
            have.is_empty() || have.iter().any(String::is_empty)
        } else {
            have.iter().any(|h| h == w)
        }
    })
}

/// The local fact store a replica synchronizes.
///
/// Facts are immutable: `put_fact` with an identifier that already exists
/// must succeed without changing the stored fact.
pub trait FactStore: Send + Sync {
    /// Lists all stored fact identifiers.
    fn list_fact_ids(&self) -> CoreResult<Vec<String>>;

    /// Gets a fact by identifier.
    fn get_fact(&self, id: &str) -> CoreResult<Option<Fact>>;

    /// Persists a fact.
    fn put_fact(&self, fact: &Fact) -> CoreResult<()>;

    /// Returns facts matching a filter.
    fn query_facts(&self, filter: &FactFilter) -> CoreResult<Vec<Fact>>;

    /// Returns true if a fact with this identifier is stored.
    fn contains_fact(&self, id: &str) -> CoreResult<bool> {
        Ok(self.get_fact(id)?.is_some())
    }
}

impl<S: FactStore + ?Sized> FactStore for std::sync::Arc<S> {
    fn list_fact_ids(&self) -> CoreResult<Vec<String>> {
        (**self).list_fact_ids()
    }

    fn get_fact(&self, id: &str) -> CoreResult<Option<Fact>> {
        (**self).get_fact(id)
    }

    fn put_fact(&self, fact: &Fact) -> CoreResult<()> {
        (**self).put_fact(fact)
    }

    fn query_facts(&self, filter: &FactFilter) -> CoreResult<Vec<Fact>> {
        (**self).query_facts(filter)
    }

    fn contains_fact(&self, id: &str) -> CoreResult<bool> {
        (**self).contains_fact(id)
    }
}

/// An in-memory fact store keyed by identifier.
#[derive(Debug, Default)]
pub struct MemoryFactStore {
    facts: RwLock<BTreeMap<String, Fact>>,
}

impl MemoryFactStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given facts.
    pub fn with_facts(facts: impl IntoIterator<Item = Fact>) -> Self {
        let store = Self::new();
        {
            let mut map = store.facts.write();
            for fact in facts {
                map.entry(fact.id.clone()).or_insert(fact);
            }
        }
        store
    }

    /// Returns all facts in identifier order.
    pub fn all_facts(&self) -> Vec<Fact> {
        self.facts.read().values().cloned().collect()
    }

    /// Number of stored facts.
    pub fn len(&self) -> usize {
        self.facts.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.facts.read().is_empty()
    }
}

impl FactStore for MemoryFactStore {
    fn list_fact_ids(&self) -> CoreResult<Vec<String>> {
        Ok(self.facts.read().keys().cloned().collect())
    }

    fn get_fact(&self, id: &str) -> CoreResult<Option<Fact>> {
        Ok(self.facts.read().get(id).cloned())
    }

    fn put_fact(&self, fact: &Fact) -> CoreResult<()> {
        if fact.id.is_empty() {
            return Err(CoreError::invalid_fact("", "fact id must not be empty"));
        }
        self.facts
            .write()
            .entry(fact.id.clone())
            .or_insert_with(|| fact.clone());
        Ok(())
    }

    fn query_facts(&self, filter: &FactFilter) -> CoreResult<Vec<Fact>> {
        Ok(self
            .facts
            .read()
            .values()
            .filter(|f| filter.matches(f))
            .cloned()
            .collect())
    }

    fn contains_fact(&self, id: &str) -> CoreResult<bool> {
        Ok(self.facts.read().contains_key(id))
    }
}
