//! Server configuration.

use attsync_engine::DEFAULT_RECV_TIMEOUT;
use std::net::SocketAddr;
use std::time::Duration;

/// Address the server binds to by default.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8771";

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Name announced in `hello`.
    pub peer_name: String,
    /// Per-message receive timeout, also applied to the WebSocket upgrade.
    pub recv_timeout: Duration,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            peer_name: "attsync-server".into(),
            recv_timeout: DEFAULT_RECV_TIMEOUT,
        }
    }

    /// Sets the announced peer name.
    pub fn with_peer_name(mut self, name: impl Into<String>) -> Self {
        self.peer_name = name.into();
        self
    }

    /// Sets the receive timeout.
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8771)))
    }
}
