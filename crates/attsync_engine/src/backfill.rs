//! Post-sync embedding backfill.
//!
//! Facts received during a cycle arrive without the vector embeddings the
//! local replica derives for search. After a cycle that received facts, the
//! missing embeddings are fetched in fixed-size batches from an external
//! service. A failing batch is logged and skipped; a later cycle picks up
//! whatever is still missing.

use crate::config::DEFAULT_EMBEDDING_BATCH_SIZE;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One embedding returned for a source fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEmbedding {
    /// Id of the fact the embedding was derived from.
    pub source_id: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Model that produced the vector.
    #[serde(default)]
    pub model: String,
    /// Vector length as reported by the service.
    #[serde(default)]
    pub dimensions: usize,
}

/// Fetches embeddings for batches of source facts.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Fetches embeddings for the given fact ids.
    ///
    /// Ids the service has no embedding for are simply absent from the result.
    async fn fetch_embeddings_by_source(
        &self,
        source_ids: &[String],
    ) -> SyncResult<Vec<SourceEmbedding>>;
}

/// Local storage for embeddings.
pub trait EmbeddingStore: Send + Sync {
    /// Ids of every fact that already has an embedding.
    fn list_stored_embedding_ids(&self) -> SyncResult<HashSet<String>>;

    /// Stores an embedding against its source fact id.
    fn store_embedding(&self, source_id: &str, vector: &[f32], model: &str) -> SyncResult<()>;
}

/// Summary of one backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Received ids that had no embedding.
    pub missing: usize,
    /// Batches requested.
    pub batches: usize,
    /// Batches that failed and were skipped.
    pub failed_batches: usize,
    /// Embeddings stored.
    pub stored: usize,
    /// Embeddings the local store rejected.
    pub store_failures: usize,
}

/// Runs the backfill against an embedding service and store.
#[derive(Clone)]
pub struct EmbeddingBackfill {
    service: Arc<dyn EmbeddingService>,
    store: Arc<dyn EmbeddingStore>,
    batch_size: usize,
}

impl EmbeddingBackfill {
    /// Creates a backfill with the default batch size of 100.
    pub fn new(service: Arc<dyn EmbeddingService>, store: Arc<dyn EmbeddingStore>) -> Self {
        Self {
            service,
            store,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }

    /// Sets the batch size. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Fetches and stores embeddings for received ids that lack one.
    ///
    /// Fails only if the stored ids cannot be listed; per-batch and
    /// per-embedding failures are counted in the report.
    pub async fn run(&self, received_ids: &[String]) -> SyncResult<BackfillReport> {
        let mut report = BackfillReport::default();
        if received_ids.is_empty() {
            return Ok(report);
        }

        let stored = self.store.list_stored_embedding_ids()?;
        let mut seen = HashSet::new();
        let mut missing = Vec::new();
        for id in received_ids {
            if !stored.contains(id) && seen.insert(id.as_str()) {
                missing.push(id.clone());
            }
        }
        report.missing = missing.len();
        if missing.is_empty() {
            debug!("all received facts already have embeddings");
            return Ok(report);
        }

        for (n, batch) in missing.chunks(self.batch_size).enumerate() {
            report.batches += 1;
            let embeddings = match self.service.fetch_embeddings_by_source(batch).await {
                Ok(embeddings) => embeddings,
                Err(e) => {
                    warn!(batch = n, size = batch.len(), error = %e, "embedding batch failed, skipping");
                    report.failed_batches += 1;
                    continue;
                }
            };

            for embedding in embeddings {
                match self.store.store_embedding(
                    &embedding.source_id,
                    &embedding.vector,
                    &embedding.model,
                ) {
                    Ok(()) => report.stored += 1,
                    Err(e) => {
                        warn!(source_id = %embedding.source_id, error = %e, "failed to store embedding");
                        report.store_failures += 1;
                    }
                }
            }
        }

        info!(
            missing = report.missing,
            batches = report.batches,
            failed = report.failed_batches,
            stored = report.stored,
            "embedding backfill finished"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for EmbeddingBackfill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingBackfill")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// A stored embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbedding {
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Model that produced it.
    pub model: String,
}

/// An in-memory embedding store.
#[derive(Debug, Default)]
pub struct MemoryEmbeddingStore {
    embeddings: RwLock<BTreeMap<String, StoredEmbedding>>,
}

impl MemoryEmbeddingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from saved embeddings.
    pub fn with_embeddings(embeddings: BTreeMap<String, StoredEmbedding>) -> Self {
        Self {
            embeddings: RwLock::new(embeddings),
        }
    }

    /// Returns the embedding for a fact.
    pub fn get(&self, source_id: &str) -> Option<StoredEmbedding> {
        self.embeddings.read().get(source_id).cloned()
    }

    /// Copies every stored embedding.
    pub fn snapshot(&self) -> BTreeMap<String, StoredEmbedding> {
        self.embeddings.read().clone()
    }

    /// Number of stored embeddings.
    pub fn len(&self) -> usize {
        self.embeddings.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.embeddings.read().is_empty()
    }
}

impl EmbeddingStore for MemoryEmbeddingStore {
    fn list_stored_embedding_ids(&self) -> SyncResult<HashSet<String>> {
        Ok(self.embeddings.read().keys().cloned().collect())
    }

    fn store_embedding(&self, source_id: &str, vector: &[f32], model: &str) -> SyncResult<()> {
        self.embeddings.write().insert(
            source_id.to_string(),
            StoredEmbedding {
                vector: vector.to_vec(),
                model: model.to_string(),
            },
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct BySourceRequest<'a> {
    source_ids: &'a [String],
}

#[derive(Deserialize)]
struct BySourceResponse {
    #[serde(default)]
    embeddings: Vec<SourceEmbedding>,
}

/// Fetches embeddings from an HTTP endpoint.
///
/// Sends `POST <base>/api/embeddings/by-source` with `{"source_ids": [...]}`
/// and expects `{"embeddings": [...]}` back.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingService {
    client: reqwest::Client,
    url: String,
}

impl HttpEmbeddingService {
    /// Creates a service for the given base URL.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Creates a service that uses an existing client.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/api/embeddings/by-source", base_url.trim_end_matches('/')),
        }
    }

    /// Full endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    async fn fetch_embeddings_by_source(
        &self,
        source_ids: &[String],
    ) -> SyncResult<Vec<SourceEmbedding>> {
        let response = self
            .client
            .post(&self.url)
            .json(&BySourceRequest { source_ids })
            .send()
            .await
            .map_err(|e| SyncError::embedding_fetch(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::embedding_fetch(format!(
                "{} returned {status}",
                self.url
            )));
        }

        let body: BySourceResponse = response
            .json()
            .await
            .map_err(|e| SyncError::embedding_fetch(format!("invalid response body: {e}")))?;
        Ok(body.embeddings)
    }
}
