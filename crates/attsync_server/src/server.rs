//! WebSocket accept loop.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use attsync_core::FactStore;
use attsync_engine::{respond, Replica, ReplicaStatus, SessionReport, WsTransport};
use parking_lot::RwLock;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Counters for connections the server has handled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Cycles that ran to completion.
    pub sessions_served: u64,
    /// Connections refused because the replica was busy.
    pub sessions_refused: u64,
    /// Connections that failed during upgrade or reconciliation.
    pub sessions_failed: u64,
    /// Facts sent to peers.
    pub facts_sent: u64,
    /// Facts received from peers and applied.
    pub facts_received: u64,
}

/// The sync server.
///
/// Each accepted connection is upgraded to a WebSocket and answered with
/// one reconciliation cycle. Connections are handled concurrently, but the
/// replica's cycle flag admits only one of them at a time; the rest are
/// closed immediately.
///
/// # Example
///
/// ```no_run
/// use attsync_core::MemoryFactStore;
/// use attsync_server::{ServerConfig, SyncServer};
///
/// # async fn run() -> attsync_server::ServerResult<()> {
/// let server = SyncServer::open(ServerConfig::default(), MemoryFactStore::new()).await?;
/// server.serve_until(async { let _ = tokio::signal::ctrl_c().await; }).await
/// # }
/// ```
pub struct SyncServer<S: FactStore> {
    config: ServerConfig,
    listener: TcpListener,
    replica: Arc<Replica<S>>,
    stats: Arc<RwLock<ServerStats>>,
}

impl<S: FactStore + 'static> SyncServer<S> {
    /// Opens a replica named after `config.peer_name` and binds the listener.
    pub async fn open(config: ServerConfig, store: S) -> ServerResult<Self> {
        let replica = Arc::new(Replica::open(config.peer_name.clone(), store)?);
        Self::bind(config, replica).await
    }

    /// Binds the listener for an existing replica.
    pub async fn bind(config: ServerConfig, replica: Arc<Replica<S>>) -> ServerResult<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        info!(
            addr = %listener.local_addr()?,
            replica = %replica.name(),
            "sync server listening"
        );
        Ok(Self {
            config,
            listener,
            replica,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Gets the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The served replica.
    pub fn replica(&self) -> &Arc<Replica<S>> {
        &self.replica
    }

    /// Gets the current stats.
    pub fn stats(&self) -> ServerStats {
        self.stats.read().clone()
    }

    /// Root digest, group digests and fact count of the served replica.
    pub fn status(&self) -> ServerResult<ReplicaStatus> {
        Ok(self.replica.status()?)
    }

    /// Serves until the task is dropped.
    pub async fn serve(&self) -> ServerResult<()> {
        self.serve_until(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, then waits for open connections.
    ///
    /// Open connections finish on their own; every one of them is bounded by
    /// the receive timeout.
    pub async fn serve_until<F>(&self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(open = connections.len(), "sync server shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    debug!(%peer, "peer connected");
                    connections.spawn(handle_connection(
                        Arc::clone(&self.replica),
                        Arc::clone(&self.stats),
                        stream,
                        peer,
                        self.config.recv_timeout,
                    ));
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

impl<S: FactStore> std::fmt::Debug for SyncServer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("config", &self.config)
            .field("replica", &self.replica.name())
            .finish()
    }
}

async fn handle_connection<S: FactStore>(
    replica: Arc<Replica<S>>,
    stats: Arc<RwLock<ServerStats>>,
    stream: TcpStream,
    peer: SocketAddr,
    recv_timeout: Duration,
) {
    match serve_peer(&*replica, stream, recv_timeout).await {
        Ok(Some(report)) => {
            info!(
                %peer,
                remote = %report.remote_name,
                sent = report.sent,
                received = report.received,
                "served sync cycle"
            );
            let mut stats = stats.write();
            stats.sessions_served += 1;
            stats.facts_sent += report.sent;
            stats.facts_received += report.received;
        }
        Ok(None) => {
            debug!(%peer, "replica busy, connection refused");
            stats.write().sessions_refused += 1;
        }
        Err(e) => {
            warn!(%peer, error = %e, "sync cycle with peer failed");
            stats.write().sessions_failed += 1;
        }
    }
}

async fn serve_peer<S: FactStore>(
    replica: &Replica<S>,
    stream: TcpStream,
    recv_timeout: Duration,
) -> ServerResult<Option<SessionReport>> {
    let ws = tokio::time::timeout(recv_timeout, tokio_tungstenite::accept_async(stream))
        .await
        .map_err(|_| ServerError::Upgrade("timed out".into()))?
        .map_err(|e| ServerError::Upgrade(e.to_string()))?;
    let transport = WsTransport::from_stream(ws, recv_timeout);
    Ok(respond(replica, transport).await?)
}
