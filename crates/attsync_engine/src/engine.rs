//! Sync orchestrator: runs cycles on demand, on a timer and on reconnect.

use crate::backfill::{BackfillReport, EmbeddingBackfill, EmbeddingService, EmbeddingStore};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::replica::Replica;
use crate::session::{run_session_as, SessionOutcome};
use crate::transport::Connector;
use attsync_core::FactStore;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Engine is connecting to the peer.
    Connecting,
    /// Engine is running the five-phase exchange.
    Reconciling,
    /// Engine is fetching embeddings for received facts.
    Backfilling,
    /// Engine has completed a sync cycle.
    Synced,
    /// The last cycle failed.
    Error,
}

impl SyncState {
    /// Returns true if the engine is in an active sync state.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Connecting | SyncState::Reconciling | SyncState::Backfilling
        )
    }
}

/// Connectivity as reported by the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// The peer is reachable.
    Online,
    /// Reachable with poor quality.
    Degraded,
    /// Not reachable.
    Offline,
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of sync cycles completed.
    pub cycles_completed: u64,
    /// Total number of sync cycles that failed.
    pub cycles_failed: u64,
    /// Triggers that found a cycle already running.
    pub cycles_skipped: u64,
    /// Total number of facts sent.
    pub facts_sent: u64,
    /// Total number of facts received and applied.
    pub facts_received: u64,
    /// Last successful sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone, Default)]
pub struct SyncCycleResult {
    /// True if another cycle was running and nothing was done.
    pub skipped: bool,
    /// True if the roots already matched.
    pub in_sync: bool,
    /// Name the peer announced.
    pub remote_name: String,
    /// Facts sent to the peer.
    pub sent: u64,
    /// Facts received and newly applied.
    pub received: u64,
    /// Ids of the newly applied facts.
    pub received_ids: Vec<String>,
    /// Received facts the store rejected.
    pub store_failures: u64,
    /// Embedding backfill summary, if it ran.
    pub backfill: Option<BackfillReport>,
    /// Duration of the sync cycle.
    pub duration: Duration,
}

impl SyncCycleResult {
    /// The zero result returned when a cycle is already running.
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// The sync engine reconciles a local replica with one peer.
pub struct SyncEngine<C: Connector, S: FactStore> {
    config: SyncConfig,
    connector: C,
    replica: Arc<Replica<S>>,
    backfill: Option<EmbeddingBackfill>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<C: Connector, S: FactStore> SyncEngine<C, S> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, connector: C, replica: Arc<Replica<S>>) -> Self {
        Self {
            config,
            connector,
            replica,
            backfill: None,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Enables the post-sync embedding backfill.
    pub fn with_embeddings(
        mut self,
        service: Arc<dyn EmbeddingService>,
        store: Arc<dyn EmbeddingStore>,
    ) -> Self {
        self.backfill = Some(
            EmbeddingBackfill::new(service, store)
                .with_batch_size(self.config.embedding_batch_size),
        );
        self
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the local replica.
    pub fn replica(&self) -> &Arc<Replica<S>> {
        &self.replica
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Sets the state.
    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Runs one cycle now.
    ///
    /// Returns [`SyncCycleResult::skipped`] immediately if a cycle is already
    /// running on the replica. Connection and protocol failures abort the
    /// cycle and are returned; the transport is closed either way.
    pub async fn sync_now(&self) -> SyncResult<SyncCycleResult> {
        let Some(_guard) = self.replica.try_begin_cycle() else {
            debug!(replica = %self.replica.name(), "cycle already in progress, skipping");
            self.stats.write().cycles_skipped += 1;
            return Ok(SyncCycleResult::skipped());
        };
        let start = Instant::now();

        self.set_state(SyncState::Connecting);
        let transport = match self.connector.connect().await {
            Ok(transport) => transport,
            Err(e) => return Err(self.handle_error(e)),
        };

        self.set_state(SyncState::Reconciling);
        let report = match run_session_as(&*self.replica, self.local_name(), transport).await {
            Ok(report) => report,
            Err(e) => return Err(self.handle_error(e)),
        };

        let mut result = SyncCycleResult {
            skipped: false,
            in_sync: report.outcome == SessionOutcome::InSync,
            remote_name: report.remote_name,
            sent: report.sent,
            received: report.received,
            received_ids: report.received_ids,
            store_failures: report.store_failures,
            backfill: None,
            duration: Duration::ZERO,
        };

        if let Some(backfill) = self.backfill.as_ref().filter(|_| result.received > 0) {
            self.set_state(SyncState::Backfilling);
            let outcome = backfill.run(&result.received_ids).await;
            match outcome {
                Ok(report) => result.backfill = Some(report),
                Err(e) => warn!(error = %e, "embedding backfill failed"),
            }
        }

        result.duration = start.elapsed();
        self.set_state(SyncState::Synced);
        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.facts_sent += result.sent;
            stats.facts_received += result.received;
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        }

        info!(
            peer = %result.remote_name,
            sent = result.sent,
            received = result.received,
            in_sync = result.in_sync,
            elapsed_ms = result.duration.as_millis() as u64,
            "sync cycle complete"
        );
        Ok(result)
    }

    /// Name announced in the hello: the configured peer name, or the
    /// replica's name when none is configured.
    pub fn local_name(&self) -> &str {
        if self.config.peer_name.is_empty() {
            self.replica.name()
        } else {
            &self.config.peer_name
        }
    }

    /// Handles an error by updating state and stats.
    fn handle_error(&self, error: SyncError) -> SyncError {
        warn!(error = %error, "sync cycle failed");
        self.set_state(SyncState::Error);
        let mut stats = self.stats.write();
        stats.cycles_failed += 1;
        stats.last_error = Some(error.to_string());
        error
    }

    async fn fire(&self, trigger: &'static str) {
        debug!(trigger, "sync triggered");
        // Failures are already logged by sync_now.
        if let Ok(result) = self.sync_now().await {
            if result.skipped {
                debug!(trigger, "trigger ignored, cycle in progress");
            }
        }
    }
}

impl<C, S> SyncEngine<C, S>
where
    C: Connector + 'static,
    S: FactStore + 'static,
{
    /// Starts the periodic and connectivity triggers.
    ///
    /// The timer runs only if [`SyncConfig::sync_interval`] is set; its first
    /// tick fires one interval after start. The connectivity watcher fires a
    /// cycle on every transition into [`Connectivity::Online`]. Dropping the
    /// returned handle stops both.
    pub fn spawn_triggers(
        self: &Arc<Self>,
        connectivity: Option<watch::Receiver<Connectivity>>,
    ) -> TriggerHandle {
        let mut tasks = Vec::new();

        if let Some(period) = self.config.sync_interval {
            let engine = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // The first tick completes immediately.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    engine.fire("interval").await;
                }
            }));
        }

        if let Some(mut rx) = connectivity {
            let engine = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                let mut previous = *rx.borrow_and_update();
                while rx.changed().await.is_ok() {
                    let current = *rx.borrow_and_update();
                    if current == Connectivity::Online && previous != Connectivity::Online {
                        engine.fire("online").await;
                    }
                    previous = current;
                }
            }));
        }

        TriggerHandle { tasks }
    }
}

impl<C: Connector, S: FactStore> std::fmt::Debug for SyncEngine<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Background trigger tasks. Dropping the handle stops them.
#[derive(Debug)]
pub struct TriggerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl TriggerHandle {
    /// Stops the triggers. A cycle already running is aborted with them.
    pub fn shutdown(self) {
        drop(self);
    }

    /// Number of running trigger tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no trigger was started.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for TriggerHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackConnector;
    use crate::session::run_session;
    use crate::transport::MemoryTransport;
    use attsync_core::{FactBuilder, MemoryFactStore};

    fn replica(name: &str, ids: &[&str]) -> Arc<Replica<MemoryFactStore>> {
        let facts = ids.iter().map(|id| {
            FactBuilder::new()
                .id(*id)
                .subject(*id)
                .actor("x")
                .context(*id)
                .build()
        });
        Arc::new(Replica::open(name, MemoryFactStore::with_facts(facts)).unwrap())
    }

    fn engine(
        local: Arc<Replica<MemoryFactStore>>,
        remote: Arc<Replica<MemoryFactStore>>,
        config: SyncConfig,
    ) -> Arc<SyncEngine<LoopbackConnector<MemoryFactStore>, MemoryFactStore>> {
        let connector = LoopbackConnector::new(remote, config.recv_timeout);
        Arc::new(SyncEngine::new(config, connector, local))
    }

    #[test]
    fn sync_state_checks() {
        assert!(SyncState::Connecting.is_active());
        assert!(SyncState::Backfilling.is_active());
        assert!(!SyncState::Idle.is_active());
        assert!(!SyncState::Error.is_active());
    }

    #[tokio::test]
    async fn sync_now_updates_state_and_stats() {
        let a = replica("a", &["f1"]);
        let b = replica("b", &["f2"]);
        let engine = engine(a.clone(), b.clone(), SyncConfig::new("a", "loopback"));
        assert_eq!(engine.state(), SyncState::Idle);

        let result = engine.sync_now().await.unwrap();
        assert!(!result.skipped);
        assert_eq!(result.received, 1);
        assert_eq!(result.remote_name, "b");
        assert!(result.backfill.is_none());
        assert_eq!(engine.state(), SyncState::Synced);

        let stats = engine.stats();
        assert_eq!(stats.cycles_completed, 1);
        assert_eq!(stats.facts_sent, 1);
        assert_eq!(stats.facts_received, 1);
        assert!(stats.last_sync_time.is_some());
    }

    #[tokio::test]
    async fn held_replica_skips() {
        let a = replica("a", &["f1"]);
        let engine = engine(a.clone(), replica("b", &[]), SyncConfig::new("a", "loopback"));

        let _guard = a.try_begin_cycle().unwrap();
        let result = engine.sync_now().await.unwrap();
        assert!(result.skipped);
        assert_eq!(result.sent, 0);
        assert_eq!(engine.stats().cycles_skipped, 1);
        assert_eq!(engine.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn busy_peer_fails_the_cycle() {
        let b = replica("b", &["f2"]);
        let engine = engine(replica("a", &[]), b.clone(), SyncConfig::new("a", "loopback"));

        let _guard = b.try_begin_cycle().unwrap();
        let err = engine.sync_now().await.unwrap_err();
        assert!(matches!(err, SyncError::ChannelClosed));
        assert_eq!(engine.state(), SyncState::Error);
        assert_eq!(engine.stats().cycles_failed, 1);
        assert!(engine.stats().last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_trigger_runs_cycles() {
        let a = replica("a", &["f1"]);
        let b = replica("b", &["f2"]);
        let config = SyncConfig::new("a", "loopback").with_sync_interval(Duration::from_secs(60));
        let engine = engine(a.clone(), b, config);

        let handle = engine.spawn_triggers(None);
        assert_eq!(handle.len(), 1);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(engine.stats().cycles_completed, 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(engine.stats().cycles_completed, 1);
        assert_eq!(a.store().len(), 2);

        handle.shutdown();
    }

    #[tokio::test]
    async fn online_transition_triggers_a_cycle() {
        let a = replica("a", &["f1"]);
        let b = replica("b", &["f2"]);
        let engine = engine(a.clone(), b, SyncConfig::new("a", "loopback"));

        let (tx, rx) = watch::channel(Connectivity::Offline);
        let _handle = engine.spawn_triggers(Some(rx));

        tx.send(Connectivity::Degraded).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(engine.stats().cycles_completed, 0);

        tx.send(Connectivity::Online).unwrap();
        for _ in 0..100 {
            if engine.stats().cycles_completed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(engine.stats().cycles_completed, 1);
        assert_eq!(a.store().len(), 2);
    }

    /// Hands out one pre-made transport.
    struct PairConnector(parking_lot::Mutex<Option<MemoryTransport>>);

    #[async_trait::async_trait]
    impl Connector for PairConnector {
        type Transport = MemoryTransport;

        async fn connect(&self) -> SyncResult<MemoryTransport> {
            self.0.lock().take().ok_or(SyncError::ChannelClosed)
        }
    }

    #[tokio::test]
    async fn hello_announces_configured_peer_name() {
        let a = replica("replica-a", &["f1"]);
        let b = replica("b", &[]);
        let (near, far) = MemoryTransport::pair(Duration::from_secs(5));
        let connector = PairConnector(parking_lot::Mutex::new(Some(near)));
        let engine = SyncEngine::new(SyncConfig::new("laptop", "pair"), connector, a);
        assert_eq!(engine.local_name(), "laptop");

        let (result, remote) = tokio::join!(engine.sync_now(), run_session(&*b, far));
        assert_eq!(result.unwrap().remote_name, "b");
        assert_eq!(remote.unwrap().remote_name, "laptop");
    }

    #[test]
    fn unnamed_config_falls_back_to_replica_name() {
        let engine = engine(replica("a", &[]), replica("b", &[]), SyncConfig::default());
        assert_eq!(engine.local_name(), "a");
    }

    #[tokio::test]
    async fn no_triggers_without_interval_or_watcher() {
        let engine = engine(replica("a", &[]), replica("b", &[]), SyncConfig::default());
        assert!(engine.spawn_triggers(None).is_empty());
    }
}
