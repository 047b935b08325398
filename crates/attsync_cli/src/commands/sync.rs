//! Sync command implementation.

use super::embeddings::FileEmbeddingStore;
use super::facts;
use attsync_core::MemoryFactStore;
use attsync_engine::{
    HttpEmbeddingService, Replica, SyncConfig, SyncCycleResult, SyncEngine, WsConnector,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Options for the sync command.
#[derive(Debug)]
pub struct SyncOptions {
    /// Peer WebSocket URL.
    pub peer: String,
    /// Name announced to the peer.
    pub name: String,
    /// Repeat interval; `None` runs one cycle.
    pub interval: Option<Duration>,
    /// Embedding service base URL and embedding file.
    pub embeddings: Option<(String, PathBuf)>,
}

type Engine = SyncEngine<WsConnector, MemoryFactStore>;

/// Runs the sync command.
///
/// One cycle runs immediately. With an interval the triggers keep running
/// until Ctrl-C. The fact file (and embedding file) is saved on exit.
pub fn run(path: &Path, options: SyncOptions) -> Result<(), Box<dyn std::error::Error>> {
    let store = facts::load(path)?;
    let replica = Arc::new(Replica::open(options.name.clone(), store)?);

    let mut config = SyncConfig::new(options.name, options.peer);
    if let Some(interval) = options.interval {
        config = config.with_sync_interval(interval);
    }
    let connector = WsConnector::from_config(&config);
    let mut engine = SyncEngine::new(config, connector, replica);

    let embeddings = match &options.embeddings {
        Some((url, file)) => {
            let store = Arc::new(FileEmbeddingStore::open(file)?);
            engine = engine.with_embeddings(
                Arc::new(HttpEmbeddingService::new(url)),
                store.clone(),
            );
            Some(store)
        }
        None => None,
    };
    let engine = Arc::new(engine);

    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(drive(&engine));

    facts::save(path, engine.replica().store())?;
    if let Some(store) = embeddings {
        store.save()?;
        info!("Saved {} embeddings", store.count());
    }
    outcome
}

async fn drive(engine: &Arc<Engine>) -> Result<(), Box<dyn std::error::Error>> {
    let first = engine.sync_now().await;
    if engine.config().sync_interval.is_none() {
        print_result(&first?);
        return Ok(());
    }
    match first {
        Ok(result) => print_result(&result),
        Err(e) => warn!("Initial sync failed: {}", e),
    }

    let triggers = engine.spawn_triggers(None);
    tokio::signal::ctrl_c().await?;
    triggers.shutdown();

    let stats = engine.stats();
    println!(
        "Stopped after {} cycles ({} failed, {} skipped)",
        stats.cycles_completed, stats.cycles_failed, stats.cycles_skipped
    );
    Ok(())
}

fn print_result(result: &SyncCycleResult) {
    if result.in_sync {
        println!("✓ Already in sync with {}", result.remote_name);
        return;
    }
    println!("✓ Synced with {}", result.remote_name);
    println!("  Sent:     {}", result.sent);
    println!("  Received: {}", result.received);
    if result.store_failures > 0 {
        println!("  Rejected: {}", result.store_failures);
    }
    if let Some(backfill) = &result.backfill {
        println!(
            "  Embeddings: {} stored, {} batches failed",
            backfill.stored, backfill.failed_batches
        );
    }
    println!("  Duration: {:?}", result.duration);
}
