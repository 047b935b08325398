//! JSON fact files.
//!
//! A fact file is a JSON array of facts. A missing file is an empty store.

use attsync_core::{Fact, MemoryFactStore};
use std::fs;
use std::path::Path;
use tracing::info;

/// Loads a fact file into an in-memory store.
pub fn load(path: &Path) -> Result<MemoryFactStore, Box<dyn std::error::Error>> {
    if !path.exists() {
        info!("No fact file at {:?}, starting empty", path);
        return Ok(MemoryFactStore::new());
    }
    let json = fs::read_to_string(path)?;
    let facts: Vec<Fact> = serde_json::from_str(&json)
        .map_err(|e| format!("Invalid fact file {:?}: {}", path, e))?;
    info!("Loaded {} facts from {:?}", facts.len(), path);
    Ok(MemoryFactStore::with_facts(facts))
}

/// Writes every fact in the store, sorted by id.
///
/// The file is written next to the target and renamed over it, so a crash
/// never leaves a truncated fact file.
pub fn save(path: &Path, store: &MemoryFactStore) -> Result<(), Box<dyn std::error::Error>> {
    let mut facts = store.all_facts();
    facts.sort_by(|a, b| a.id.cmp(&b.id));

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(&facts)?)?;
    fs::rename(&tmp, path)?;
    info!("Saved {} facts to {:?}", facts.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use attsync_core::FactStore;
    use attsync_testkit::prelude::*;

    #[test]
    fn missing_file_is_empty() {
        let file = TempFactFile::empty();
        assert!(load(file.path()).unwrap().is_empty());
    }

    #[test]
    fn save_then_load() {
        let file = TempFactFile::empty();
        let store = MemoryFactStore::with_facts([fact("b", "x", "y"), fact("a", "x", "z")]);
        save(file.path(), &store).unwrap();

        assert_eq!(ids_of(&file.read()), vec!["a", "b"]);
        let loaded = load(file.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains_fact("a").unwrap());
    }

    #[test]
    fn malformed_file_is_rejected() {
        let file = TempFactFile::empty();
        std::fs::write(file.path(), "{not json").unwrap();
        let err = load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid fact file"));
    }
}
