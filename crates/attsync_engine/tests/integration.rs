//! Integration tests for reconciliation between replicas.

use async_trait::async_trait;
use attsync_engine::{
    run_session, Connector, EmbeddingService, LoopbackConnector, MemoryEmbeddingStore,
    MemoryTransport, Replica, SessionOutcome, SourceEmbedding, SyncConfig, SyncEngine, SyncError,
    SyncResult, SyncState, SyncTransport,
};
use attsync_protocol::SyncMessage;
use attsync_testkit::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

type MemReplica = Arc<Replica<MemoryFactStore>>;

fn replica(name: &str, facts: Vec<Fact>) -> MemReplica {
    Arc::new(Replica::open(name, MemoryFactStore::with_facts(facts)).unwrap())
}

fn loopback_engine(
    local: MemReplica,
    remote: MemReplica,
) -> SyncEngine<LoopbackConnector<MemoryFactStore>, MemoryFactStore> {
    let config = SyncConfig::new(local.name().to_string(), "loopback");
    let connector = LoopbackConnector::new(remote, config.recv_timeout);
    SyncEngine::new(config, connector, local)
}

fn stored_ids(replica: &MemReplica) -> Vec<String> {
    ids_of(&replica.store().all_facts())
}

#[tokio::test]
async fn two_replicas_converge_then_stay_quiet() {
    let a = replica("a", vec![fact("f1", "x", "y")]);
    let b = replica("b", vec![fact("f2", "x", "z")]);
    let engine = loopback_engine(a.clone(), b.clone());

    let first = engine.sync_now().await.unwrap();
    assert!(!first.in_sync);
    assert_eq!(first.sent, 1);
    assert_eq!(first.received, 1);
    assert_eq!(first.received_ids, vec!["f2".to_string()]);

    assert_eq!(stored_ids(&a), vec!["f1", "f2"]);
    assert_eq!(stored_ids(&b), vec!["f1", "f2"]);
    assert_eq!(a.root(), b.root());

    let second = engine.sync_now().await.unwrap();
    assert!(second.in_sync);
    assert_eq!(second.sent, 0);
    assert_eq!(second.received, 0);
    assert_eq!(engine.stats().cycles_completed, 2);
}

#[tokio::test]
async fn replicas_built_from_the_same_facts_take_the_fast_path() {
    let facts = fact_batch("f", 20, 4);
    let a = replica("a", facts.clone());
    let mut reversed = facts;
    reversed.reverse();
    let b = replica("b", reversed);
    assert_eq!(a.root(), b.root());

    let (ta, tb) = MemoryTransport::pair(Duration::from_secs(5));
    let (ra, rb) = tokio::join!(run_session(&*a, ta), run_session(&*b, tb));
    assert_eq!(ra.unwrap().outcome, SessionOutcome::InSync);
    assert_eq!(rb.unwrap().outcome, SessionOutcome::InSync);
}

/// Holds `connect` until the test opens the gate.
struct GatedConnector {
    inner: LoopbackConnector<MemoryFactStore>,
    gate: Arc<Notify>,
}

#[async_trait]
impl Connector for GatedConnector {
    type Transport = MemoryTransport;

    async fn connect(&self) -> SyncResult<MemoryTransport> {
        self.gate.notified().await;
        self.inner.connect().await
    }
}

#[tokio::test]
async fn second_trigger_during_connect_is_skipped() {
    let a = replica("a", vec![fact("f1", "x", "y")]);
    let b = replica("b", vec![fact("f2", "x", "z")]);
    let gate = Arc::new(Notify::new());
    let connector = GatedConnector {
        inner: LoopbackConnector::new(b, Duration::from_secs(5)),
        gate: gate.clone(),
    };
    let engine = Arc::new(SyncEngine::new(SyncConfig::new("a", "gated"), connector, a));

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.sync_now().await }
    });
    while engine.state() != SyncState::Connecting {
        tokio::task::yield_now().await;
    }

    let second = engine.sync_now().await.unwrap();
    assert!(second.skipped);
    assert_eq!(second.sent + second.received, 0);

    gate.notify_one();
    let first = first.await.unwrap().unwrap();
    assert!(!first.skipped);
    assert_eq!(first.received, 1);

    let stats = engine.stats();
    assert_eq!(stats.cycles_completed, 1);
    assert_eq!(stats.cycles_skipped, 1);
}

/// Hands out one pre-built transport.
struct HandOff(Mutex<Option<MemoryTransport>>);

#[async_trait]
impl Connector for HandOff {
    type Transport = MemoryTransport;

    async fn connect(&self) -> SyncResult<MemoryTransport> {
        self.0.lock().take().ok_or(SyncError::ChannelClosed)
    }
}

#[tokio::test(start_paused = true)]
async fn silent_peer_times_out_and_the_transport_is_closed() {
    let recv_timeout = Duration::from_secs(30);
    let (local, mut far) = MemoryTransport::pair(recv_timeout);
    let config = SyncConfig::new("a", "silent").with_recv_timeout(recv_timeout);
    let engine = SyncEngine::new(
        config,
        HandOff(Mutex::new(Some(local))),
        replica("a", vec![fact("f1", "x", "y")]),
    );

    let start = tokio::time::Instant::now();
    let err = engine.sync_now().await.unwrap_err();
    assert!(matches!(err, SyncError::RecvTimeout));
    assert!(start.elapsed() >= recv_timeout);
    assert_eq!(engine.state(), SyncState::Error);
    assert!(!engine.replica().is_cycle_active());

    assert!(matches!(far.receive().await.unwrap(), SyncMessage::Hello(_)));
    assert!(matches!(
        far.receive().await.unwrap_err(),
        SyncError::ChannelClosed
    ));
}

#[tokio::test]
async fn one_rejected_fact_does_not_abort_the_cycle() {
    let failing = FailingStore::new(MemoryFactStore::new());
    failing.fail_put_for(["f2"]);
    let a = Replica::open("a", failing).unwrap();
    let b = replica(
        "b",
        vec![fact("f1", "x", "y"), fact("f2", "x", "y"), fact("f3", "x", "y")],
    );

    let (ta, tb) = MemoryTransport::pair(Duration::from_secs(5));
    let (ra, rb) = tokio::join!(run_session(&a, ta), run_session(&*b, tb));
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert_eq!(ra.received, 2);
    assert_eq!(ra.store_failures, 1);
    assert_eq!(rb.remote_done.received, 2);
    assert_eq!(ids_of(&a.store().inner().all_facts()), vec!["f1", "f3"]);
    assert!(a.has_content(&fact("f3", "x", "y").content_hash()));
    assert!(!a.has_content(&fact("f2", "x", "y").content_hash()));
    assert_ne!(a.root(), b.root());
}

/// Returns a fixed vector for every requested id.
struct EchoEmbeddings;

#[async_trait]
impl EmbeddingService for EchoEmbeddings {
    async fn fetch_embeddings_by_source(
        &self,
        source_ids: &[String],
    ) -> SyncResult<Vec<SourceEmbedding>> {
        Ok(source_ids
            .iter()
            .map(|id| SourceEmbedding {
                source_id: id.clone(),
                vector: vec![1.0, 0.0, 0.0],
                model: "echo".into(),
                dimensions: 3,
            })
            .collect())
    }
}

#[tokio::test]
async fn received_facts_get_embeddings() {
    let a = replica("a", vec![]);
    let b = replica("b", fact_batch("f", 5, 2));
    let store = Arc::new(MemoryEmbeddingStore::new());
    let engine = loopback_engine(a, b).with_embeddings(Arc::new(EchoEmbeddings), store.clone());

    let result = engine.sync_now().await.unwrap();
    assert_eq!(result.received, 5);
    let backfill = result.backfill.unwrap();
    assert_eq!(backfill.missing, 5);
    assert_eq!(backfill.batches, 1);
    assert_eq!(store.len(), 5);
    assert_eq!(store.get("f-3").unwrap().model, "echo");

    let quiet = engine.sync_now().await.unwrap();
    assert!(quiet.backfill.is_none());
}

mod convergence {
    use super::*;
    use proptest::prelude::*;

    const PAIRS: [(usize, usize); 3] = [(0, 1), (1, 2), (0, 2)];

    async fn sync(replicas: &[MemReplica], (i, j): (usize, usize)) {
        let (ti, tj) = MemoryTransport::pair(Duration::from_secs(5));
        let (ri, rj) = tokio::join!(
            run_session(&*replicas[i], ti),
            run_session(&*replicas[j], tj)
        );
        ri.unwrap();
        rj.unwrap();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn three_replicas_converge_in_any_order(
            sets in prop::collection::vec(fact_set_strategy(12), 3),
            warmup in prop::collection::vec(prop::sample::select(PAIRS.to_vec()), 0..4),
            order in Just(PAIRS.to_vec()).prop_shuffle(),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let mut expected: Vec<String> = sets.iter().flatten().map(|f| f.id.clone()).collect();
            expected.sort();
            expected.dedup();

            let replicas: Vec<MemReplica> = sets
                .into_iter()
                .enumerate()
                .map(|(n, facts)| replica(&format!("r{n}"), facts))
                .collect();

            runtime.block_on(async {
                for pair in warmup {
                    sync(&replicas, pair).await;
                }
                for pair in order {
                    sync(&replicas, pair).await;
                }
            });

            let root = replicas[0].root();
            for r in &replicas {
                prop_assert_eq!(r.root(), root);
                prop_assert_eq!(stored_ids(r), expected.clone());
            }
        }
    }
}
