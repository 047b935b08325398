//! Embedding store persisted as a JSON file.

use attsync_engine::{EmbeddingStore, MemoryEmbeddingStore, StoredEmbedding, SyncResult};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// A [`MemoryEmbeddingStore`] loaded from and saved to a JSON object keyed by
/// source id.
#[derive(Debug)]
pub struct FileEmbeddingStore {
    path: PathBuf,
    inner: MemoryEmbeddingStore,
}

impl FileEmbeddingStore {
    /// Loads the file, or starts empty if it does not exist.
    pub fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let embeddings: BTreeMap<String, StoredEmbedding> = if path.exists() {
            serde_json::from_str(&fs::read_to_string(path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            inner: MemoryEmbeddingStore::with_embeddings(embeddings),
        })
    }

    /// Writes every stored embedding back to the file.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string(&self.inner.snapshot())?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    /// Number of stored embeddings.
    pub fn count(&self) -> usize {
        self.inner.len()
    }
}

impl EmbeddingStore for FileEmbeddingStore {
    fn list_stored_embedding_ids(&self) -> SyncResult<HashSet<String>> {
        self.inner.list_stored_embedding_ids()
    }

    fn store_embedding(&self, source_id: &str, vector: &[f32], model: &str) -> SyncResult<()> {
        self.inner.store_embedding(source_id, vector, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn embeddings_survive_a_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.json");

        let store = FileEmbeddingStore::open(&path).unwrap();
        assert_eq!(store.count(), 0);
        store.store_embedding("f1", &[0.5, 0.25], "mini").unwrap();
        store.save().unwrap();

        let reopened = FileEmbeddingStore::open(&path).unwrap();
        assert_eq!(reopened.count(), 1);
        assert!(reopened.list_stored_embedding_ids().unwrap().contains("f1"));
    }
}
