//! Configuration for the sync engine.

use std::time::Duration;

/// Default bound on the connection handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on a single receive.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of source ids per embedding request.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 100;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Name announced to peers in the hello message.
    pub peer_name: String,
    /// Peer endpoint (`ws://host:port/path`).
    pub endpoint: String,
    /// Connection handshake timeout.
    pub connect_timeout: Duration,
    /// Per-message receive timeout.
    pub recv_timeout: Duration,
    /// Interval for periodic sync. `None` disables the timer.
    pub sync_interval: Option<Duration>,
    /// Source ids per embedding backfill request.
    pub embedding_batch_size: usize,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(peer_name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            peer_name: peer_name.into(),
            endpoint: endpoint.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            sync_interval: None,
            embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the receive timeout.
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Sets the sync interval for automatic sync.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Sets the embedding batch size. Zero is treated as one.
    pub fn with_embedding_batch_size(mut self, size: usize) -> Self {
        self.embedding_batch_size = size.max(1);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::new("laptop", "ws://localhost:8771/ws");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.recv_timeout, Duration::from_secs(30));
        assert_eq!(config.embedding_batch_size, 100);
        assert!(config.sync_interval.is_none());
    }

    #[test]
    fn builder() {
        let config = SyncConfig::default()
            .with_connect_timeout(Duration::from_secs(1))
            .with_recv_timeout(Duration::from_secs(2))
            .with_sync_interval(Duration::from_secs(60))
            .with_embedding_batch_size(0);

        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.recv_timeout, Duration::from_secs(2));
        assert_eq!(config.sync_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.embedding_batch_size, 1);
    }
}
