//! One reconciliation cycle between two replicas.
//!
//! The protocol is symmetric: both sides send their half of a phase, then
//! wait for the peer's half. There is no initiator-specific logic, so the
//! same code runs on the connecting side and on the accepting side.
//!
//! 1. `hello`: root digests. Equal roots skip straight to `done`.
//! 2. `group_hashes`: every group digest.
//! 3. `need`: remote-only and divergent groups, as computed by the local diff.
//! 4. `attestations`: every stored fact in each group the peer asked for.
//! 5. `done`: counters, exchanged after received facts are applied.

use crate::error::{SyncError, SyncResult};
use crate::replica::Replica;
use crate::transport::SyncTransport;
use attsync_core::{Fact, FactFilter, FactStore};
use attsync_protocol::{
    Attestations, Done, GroupHashes, Hello, MessageKind, Need, Phase, SyncMessage,
};
use tracing::{debug, info, warn};

/// How a completed cycle went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Roots matched; nothing was exchanged beyond hello and done.
    InSync,
    /// Digests, needs and facts were exchanged.
    Reconciled,
}

/// Result of one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// How the cycle went.
    pub outcome: SessionOutcome,
    /// Name the peer announced.
    pub remote_name: String,
    /// Facts sent to the peer.
    pub sent: u64,
    /// Facts received and newly applied.
    pub received: u64,
    /// Ids of the newly applied facts.
    pub received_ids: Vec<String>,
    /// Received facts skipped because the store rejected them.
    pub store_failures: u64,
    /// Counters the peer reported in its `done`.
    pub remote_done: Done,
}

/// Runs one cycle over an open transport, then closes it.
///
/// The transport is closed on every exit path. The hello announces the
/// replica's own name.
pub async fn run_session<S, T>(replica: &Replica<S>, transport: T) -> SyncResult<SessionReport>
where
    S: FactStore,
    T: SyncTransport,
{
    run_session_as(replica, replica.name(), transport).await
}

/// Like [`run_session`], announcing `local_name` in the hello instead.
pub async fn run_session_as<S, T>(
    replica: &Replica<S>,
    local_name: &str,
    mut transport: T,
) -> SyncResult<SessionReport>
where
    S: FactStore,
    T: SyncTransport,
{
    let result = Session {
        replica,
        local_name,
        transport: &mut transport,
        phase: Phase::Idle,
    }
    .run()
    .await;
    transport.close().await;
    result
}

/// Serves one cycle for a peer that connected to us.
///
/// Returns `Ok(None)` after closing the transport if the replica is already
/// in a cycle.
pub async fn respond<S, T>(replica: &Replica<S>, mut transport: T) -> SyncResult<Option<SessionReport>>
where
    S: FactStore,
    T: SyncTransport,
{
    let Some(_guard) = replica.try_begin_cycle() else {
        debug!(replica = %replica.name(), "cycle in progress, refusing peer");
        transport.close().await;
        return Ok(None);
    };
    run_session(replica, transport).await.map(Some)
}

/// Runs one cycle over `transport` without closing it.
///
/// Callers are responsible for the cycle flag and for closing the transport;
/// [`run_session`] does the latter.
pub async fn reconcile<S, T>(replica: &Replica<S>, transport: &mut T) -> SyncResult<SessionReport>
where
    S: FactStore,
    T: SyncTransport + ?Sized,
{
    Session {
        replica,
        local_name: replica.name(),
        transport,
        phase: Phase::Idle,
    }
    .run()
    .await
}

struct Session<'a, S, T: ?Sized> {
    replica: &'a Replica<S>,
    local_name: &'a str,
    transport: &'a mut T,
    phase: Phase,
}

/// Outcome of applying one batch of received facts.
#[derive(Default)]
struct Applied {
    ids: Vec<String>,
    failures: u64,
}

impl<S, T> Session<'_, S, T>
where
    S: FactStore,
    T: SyncTransport + ?Sized,
{
    async fn run(mut self) -> SyncResult<SessionReport> {
        // Phase 1: hello
        let root = self.replica.root();
        self.send(SyncMessage::Hello(Hello::new(root.digest, self.local_name)))?;
        let remote = match self.recv().await? {
            SyncMessage::Hello(hello) => hello,
            other => return Err(unexpected(other.kind())),
        };
        debug!(
            peer = %remote.peer_name,
            local_root = %root.digest.short(),
            remote_root = %remote.root_hash.short(),
            "hello exchanged"
        );

        self.phase = self.phase.compare_roots(&root.digest, &remote.root_hash);
        if self.phase == Phase::InSync {
            self.send(SyncMessage::Done(Done::new(0, 0)))?;
            let remote_done = self.recv_done().await?;
            info!(peer = %remote.peer_name, "already in sync");
            return Ok(SessionReport {
                outcome: SessionOutcome::InSync,
                remote_name: remote.peer_name,
                sent: 0,
                received: 0,
                received_ids: Vec::new(),
                store_failures: 0,
                remote_done,
            });
        }

        // Phase 2: group digests
        let local_groups = self.replica.group_digests();
        self.send(SyncMessage::GroupHashes(GroupHashes {
            groups: local_groups,
        }))?;
        let remote_groups = match self.recv().await? {
            SyncMessage::GroupHashes(groups) => groups.groups,
            other => return Err(unexpected(other.kind())),
        };

        // Phase 3: needs
        let need = self
            .replica
            .with_index(|index| index.diff(&remote_groups).need());
        debug!(peer = %remote.peer_name, groups = need.len(), "requesting groups");
        self.send(SyncMessage::Need(Need { need }))?;
        let remote_need = match self.recv().await? {
            SyncMessage::Need(need) => need.need,
            other => return Err(unexpected(other.kind())),
        };

        // Phase 4: facts
        let outgoing = self.collect(&remote_need);
        let sent = outgoing.fact_count() as u64;
        self.send(SyncMessage::Attestations(outgoing))?;
        let incoming = match self.recv().await? {
            SyncMessage::Attestations(batch) => batch,
            other => return Err(unexpected(other.kind())),
        };

        // Phase 5: apply, then done
        let applied = self.apply(incoming);
        let received = applied.ids.len() as u64;
        self.send(SyncMessage::Done(Done::new(sent, received)))?;
        let remote_done = self.recv_done().await?;

        info!(
            peer = %remote.peer_name,
            sent,
            received,
            store_failures = applied.failures,
            "reconciled"
        );
        Ok(SessionReport {
            outcome: SessionOutcome::Reconciled,
            remote_name: remote.peer_name,
            sent,
            received,
            received_ids: applied.ids,
            store_failures: applied.failures,
            remote_done,
        })
    }

    fn send(&mut self, message: SyncMessage) -> SyncResult<()> {
        self.phase = self.phase.sent(message.kind())?;
        self.transport.send(&message)
    }

    async fn recv(&mut self) -> SyncResult<SyncMessage> {
        let message = self.transport.receive().await?;
        self.phase = self.phase.received(message.kind())?;
        Ok(message)
    }

    async fn recv_done(&mut self) -> SyncResult<Done> {
        match self.recv().await? {
            SyncMessage::Done(done) => Ok(done),
            other => Err(unexpected(other.kind())),
        }
    }

    /// Gathers the stored facts of every requested group we can resolve.
    fn collect(&self, requested: &[String]) -> Attestations {
        let mut batch = Attestations::default();
        for encoding in requested {
            let Some(key) = self
                .replica
                .with_index(|index| index.find_group_key_by_encoding(encoding).cloned())
            else {
                debug!(group = %encoding, "peer asked for unknown group");
                continue;
            };

            match self.replica.store().query_facts(&FactFilter::group(&key)) {
                Ok(facts) if facts.is_empty() => {}
                Ok(facts) => {
                    batch.attestations.insert(encoding.clone(), facts);
                }
                Err(e) => {
                    warn!(actor = %key.actor, context = %key.context, error = %e, "group query failed, skipping");
                }
            }
        }
        batch
    }

    /// Persists and indexes received facts. Per-fact failures are skipped.
    fn apply(&self, incoming: Attestations) -> Applied {
        let mut applied = Applied::default();
        for fact in incoming.attestations.into_values().flatten() {
            match self.apply_one(&fact) {
                Ok(true) => applied.ids.push(fact.id),
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "skipping received fact");
                    applied.failures += 1;
                }
            }
        }
        applied
    }

    fn apply_one(&self, fact: &Fact) -> SyncResult<bool> {
        let content_hash = fact.content_hash();
        if self.replica.has_content(&content_hash) {
            debug!(id = %fact.id, hash = %content_hash.short(), "content already present");
            return Ok(false);
        }
        self.replica
            .ingest(fact)
            .map_err(|e| SyncError::StoreFailure {
                fact_id: fact.id.clone(),
                message: e.to_string(),
            })
    }
}

fn unexpected(kind: MessageKind) -> SyncError {
    SyncError::Protocol(format!("unexpected {kind} message"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use attsync_core::{Digest, FactBuilder, MemoryFactStore};
    use std::time::Duration;

    fn fact(id: &str, actor: &str, context: &str) -> Fact {
        FactBuilder::new()
            .id(id)
            .subject(id)
            .predicate("member")
            .actor(actor)
            .context(context)
            .timestamp(1_700_000_000_000)
            .source("test")
            .build()
    }

    fn replica(name: &str, facts: Vec<Fact>) -> Replica<MemoryFactStore> {
        Replica::open(name, MemoryFactStore::with_facts(facts)).unwrap()
    }

    async fn sync_pair(
        a: &Replica<MemoryFactStore>,
        b: &Replica<MemoryFactStore>,
    ) -> (SessionReport, SessionReport) {
        let (ta, tb) = MemoryTransport::pair(Duration::from_secs(5));
        let (ra, rb) = tokio::join!(run_session(a, ta), run_session(b, tb));
        (ra.unwrap(), rb.unwrap())
    }

    #[tokio::test]
    async fn divergent_replicas_exchange_missing_facts() {
        let a = replica("a", vec![fact("f1", "x", "y")]);
        let b = replica("b", vec![fact("f2", "x", "z")]);

        let (ra, rb) = sync_pair(&a, &b).await;
        assert_eq!(ra.outcome, SessionOutcome::Reconciled);
        assert_eq!((ra.sent, ra.received), (1, 1));
        assert_eq!((rb.sent, rb.received), (1, 1));
        assert_eq!(ra.received_ids, vec!["f2".to_string()]);
        assert_eq!(ra.remote_name, "b");
        assert_eq!(ra.remote_done, Done::new(1, 1));
        assert_eq!(a.root(), b.root());
    }

    #[tokio::test]
    async fn equal_roots_take_the_fast_path() {
        let a = replica("a", vec![fact("f1", "x", "y")]);
        let b = replica("b", vec![fact("f1", "x", "y")]);

        let (ra, rb) = sync_pair(&a, &b).await;
        assert_eq!(ra.outcome, SessionOutcome::InSync);
        assert_eq!(rb.outcome, SessionOutcome::InSync);
        assert_eq!(ra.remote_done, Done::new(0, 0));
    }

    #[tokio::test]
    async fn same_claim_under_another_id_is_not_applied() {
        let a = replica("a", vec![fact("f1", "x", "y")]);
        let mut twin = fact("f1", "x", "y");
        twin.id = "f1-copy".into();
        let b = replica("b", vec![twin, fact("f2", "x", "y")]);

        let (ra, _) = sync_pair(&a, &b).await;
        assert_eq!(ra.received_ids, vec!["f2".to_string()]);
        assert!(!a.store().contains_fact("f1-copy").unwrap());
    }

    #[tokio::test]
    async fn multi_group_fact_is_applied_once() {
        let shared = FactBuilder::new()
            .id("f1")
            .actors(["x", "w"])
            .contexts(["y", "z"])
            .build();
        let a = replica("a", vec![shared]);
        let b = replica("b", vec![]);

        let (ra, rb) = sync_pair(&a, &b).await;
        assert_eq!(ra.sent, 4);
        assert_eq!(rb.received, 1);
        assert_eq!(a.root(), b.root());
        assert_eq!(b.root().group_count, 4);
    }

    #[tokio::test]
    async fn explicit_empty_actor_tag_reaches_the_peer() {
        let a = replica("a", vec![fact("f1", "", "y")]);
        let b = replica("b", vec![]);

        let (ra, rb) = sync_pair(&a, &b).await;
        assert_eq!(ra.outcome, SessionOutcome::Reconciled);
        assert_eq!(ra.sent, 1);
        assert_eq!(rb.received_ids, vec!["f1".to_string()]);
        assert_eq!(a.root(), b.root());

        let (ra, _) = sync_pair(&a, &b).await;
        assert_eq!(ra.outcome, SessionOutcome::InSync);
    }

    #[tokio::test]
    async fn unknown_need_encoding_is_skipped() {
        let a = replica("a", vec![fact("f1", "x", "y")]);
        let (mut ta, mut tb) = MemoryTransport::pair(Duration::from_secs(5));

        let peer = async {
            let _hello = tb.receive().await.unwrap();
            tb.send(&SyncMessage::Hello(Hello::new(Digest::from_bytes([7; 32]), "peer")))
                .unwrap();
            let _groups = tb.receive().await.unwrap();
            tb.send(&SyncMessage::GroupHashes(GroupHashes::default()))
                .unwrap();
            let _need = tb.receive().await.unwrap();
            tb.send(&SyncMessage::Need(Need {
                need: vec!["ff".repeat(32), "not-hex".into()],
            }))
            .unwrap();
            let sent = tb.receive().await.unwrap();
            tb.send(&SyncMessage::Attestations(Attestations::default()))
                .unwrap();
            let _done = tb.receive().await.unwrap();
            tb.send(&SyncMessage::Done(Done::new(0, 0))).unwrap();
            sent
        };

        let (report, sent) = tokio::join!(reconcile(&a, &mut ta), peer);
        let report = report.unwrap();
        assert_eq!(report.sent, 0);
        assert_eq!(sent, SyncMessage::Attestations(Attestations::default()));
    }

    #[tokio::test]
    async fn out_of_order_message_aborts() {
        let a = replica("a", vec![fact("f1", "x", "y")]);
        let (mut ta, mut tb) = MemoryTransport::pair(Duration::from_secs(5));
        tb.send(&SyncMessage::Done(Done::new(0, 0))).unwrap();

        let err = reconcile(&a, &mut ta).await.unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert!(err.to_string().contains("expected hello"));
    }

    #[tokio::test]
    async fn responder_refuses_while_busy() {
        let a = replica("a", vec![]);
        let (ta, mut tb) = MemoryTransport::pair(Duration::from_secs(5));

        let _guard = a.try_begin_cycle().unwrap();
        assert!(respond(&a, ta).await.unwrap().is_none());
        assert!(matches!(
            tb.receive().await.unwrap_err(),
            SyncError::ChannelClosed
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out_and_transport_closes() {
        let a = replica("a", vec![fact("f1", "x", "y")]);
        let (ta, mut tb) = MemoryTransport::pair(Duration::from_secs(30));

        let err = run_session(&a, ta).await.unwrap_err();
        assert!(matches!(err, SyncError::RecvTimeout));

        // The hello was queued before the timeout; after it the queue ends.
        assert!(matches!(tb.receive().await.unwrap(), SyncMessage::Hello(_)));
        assert!(matches!(
            tb.receive().await.unwrap_err(),
            SyncError::ChannelClosed
        ));
    }
}
