//! In-process connector for tests and embedded setups.

use crate::error::SyncResult;
use crate::replica::Replica;
use crate::session::respond;
use crate::transport::{Connector, MemoryTransport};
use async_trait::async_trait;
use attsync_core::FactStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Connects to a replica in the same process.
///
/// Each `connect` spawns the remote replica's side of the session on the far
/// end of a [`MemoryTransport`] pair, exactly as a server would for an
/// incoming connection. A new connection waits for the previous remote
/// session to finish first.
pub struct LoopbackConnector<S> {
    remote: Arc<Replica<S>>,
    recv_timeout: Duration,
    last_session: Mutex<Option<JoinHandle<()>>>,
}

impl<S: FactStore> LoopbackConnector<S> {
    /// Creates a connector to `remote`.
    pub fn new(remote: Arc<Replica<S>>, recv_timeout: Duration) -> Self {
        Self {
            remote,
            recv_timeout,
            last_session: Mutex::new(None),
        }
    }

    /// The remote replica.
    pub fn remote(&self) -> &Arc<Replica<S>> {
        &self.remote
    }
}

#[async_trait]
impl<S: FactStore + 'static> Connector for LoopbackConnector<S> {
    type Transport = MemoryTransport;

    async fn connect(&self) -> SyncResult<MemoryTransport> {
        let previous = self.last_session.lock().take();
        if let Some(previous) = previous {
            let _ = previous.await;
        }

        let (local, far) = MemoryTransport::pair(self.recv_timeout);
        let remote = Arc::clone(&self.remote);
        let session = tokio::spawn(async move {
            match respond(&*remote, far).await {
                Ok(Some(report)) => {
                    debug!(replica = %remote.name(), received = report.received, "loopback session done")
                }
                Ok(None) => {}
                Err(e) => debug!(replica = %remote.name(), error = %e, "loopback session failed"),
            }
        });
        *self.last_session.lock() = Some(session);
        Ok(local)
    }
}

impl<S> std::fmt::Debug for LoopbackConnector<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackConnector")
            .field("remote", &self.remote)
            .field("recv_timeout", &self.recv_timeout)
            .finish_non_exhaustive()
    }
}
