//! A fact store with injectable failures.

use attsync_core::{CoreError, CoreResult, Fact, FactFilter, FactStore, MemoryFactStore};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Wraps a [`MemoryFactStore`] and fails chosen operations.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryFactStore,
    fail_put: RwLock<HashSet<String>>,
    fail_queries: AtomicBool,
    rejected_puts: AtomicUsize,
}

impl FailingStore {
    /// Wraps a store. Nothing fails until configured.
    pub fn new(inner: MemoryFactStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Makes `put_fact` fail for these ids.
    pub fn fail_put_for<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fail_put.write().extend(ids.into_iter().map(Into::into));
    }

    /// Makes every `query_facts` call fail.
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Number of puts rejected so far.
    pub fn rejected_puts(&self) -> usize {
        self.rejected_puts.load(Ordering::SeqCst)
    }

    /// The wrapped store.
    pub fn inner(&self) -> &MemoryFactStore {
        &self.inner
    }
}

impl FactStore for FailingStore {
    fn list_fact_ids(&self) -> CoreResult<Vec<String>> {
        self.inner.list_fact_ids()
    }

    fn get_fact(&self, id: &str) -> CoreResult<Option<Fact>> {
        self.inner.get_fact(id)
    }

    fn put_fact(&self, fact: &Fact) -> CoreResult<()> {
        if self.fail_put.read().contains(&fact.id) {
            self.rejected_puts.fetch_add(1, Ordering::SeqCst);
            return Err(CoreError::store(format!("injected put failure for {}", fact.id)));
        }
        self.inner.put_fact(fact)
    }

    fn query_facts(&self, filter: &FactFilter) -> CoreResult<Vec<Fact>> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(CoreError::store("injected query failure"));
        }
        self.inner.query_facts(filter)
    }

    fn contains_fact(&self, id: &str) -> CoreResult<bool> {
        self.inner.contains_fact(id)
    }
}
