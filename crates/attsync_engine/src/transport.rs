//! Transport layer abstraction for reconciliation sessions.
//!
//! A transport carries JSON text frames between two replicas for exactly one
//! cycle. Sending only enqueues; receiving waits for one frame under a
//! timeout.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use attsync_protocol::SyncMessage;
use std::time::Duration;
use tokio::sync::mpsc;

/// A bidirectional message channel to one peer.
#[async_trait]
pub trait SyncTransport: Send {
    /// Enqueues a message for the peer. Never waits.
    fn send(&mut self, message: &SyncMessage) -> SyncResult<()>;

    /// Waits for the next message.
    ///
    /// Fails with [`SyncError::RecvTimeout`] when nothing arrives within the
    /// configured bound and with [`SyncError::ChannelClosed`] when the peer
    /// disconnects first.
    async fn receive(&mut self) -> SyncResult<SyncMessage>;

    /// Closes the transport. Calling it again is a no-op.
    async fn close(&mut self);

    /// Returns true once [`close`](Self::close) has run.
    fn is_closed(&self) -> bool;
}

/// Opens transports to a fixed peer.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Transport produced by this connector.
    type Transport: SyncTransport + 'static;

    /// Connects, failing with [`SyncError::ConnectTimeout`] when the
    /// handshake does not complete in time.
    async fn connect(&self) -> SyncResult<Self::Transport>;
}

/// Waits for one queued frame and decodes it.
///
/// The timeout and the queue are raced in a single future, so nothing stays
/// registered once it settles.
pub(crate) async fn recv_frame(
    inbound: &mut mpsc::UnboundedReceiver<String>,
    recv_timeout: Duration,
) -> SyncResult<SyncMessage> {
    match tokio::time::timeout(recv_timeout, inbound.recv()).await {
        Err(_) => Err(SyncError::RecvTimeout),
        Ok(None) => Err(SyncError::ChannelClosed),
        Ok(Some(text)) => Ok(SyncMessage::decode(&text)?),
    }
}

/// One end of an in-process transport pair.
#[derive(Debug)]
pub struct MemoryTransport {
    outbound: Option<mpsc::UnboundedSender<String>>,
    inbound: mpsc::UnboundedReceiver<String>,
    recv_timeout: Duration,
}

impl MemoryTransport {
    /// Creates two connected ends.
    pub fn pair(recv_timeout: Duration) -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: Some(a_tx),
                inbound: b_rx,
                recv_timeout,
            },
            Self {
                outbound: Some(b_tx),
                inbound: a_rx,
                recv_timeout,
            },
        )
    }
}

#[async_trait]
impl SyncTransport for MemoryTransport {
    fn send(&mut self, message: &SyncMessage) -> SyncResult<()> {
        let tx = self.outbound.as_ref().ok_or(SyncError::ChannelClosed)?;
        let text = message.encode()?;
        tx.send(text).map_err(|_| SyncError::ChannelClosed)
    }

    async fn receive(&mut self) -> SyncResult<SyncMessage> {
        if self.outbound.is_none() {
            return Err(SyncError::ChannelClosed);
        }
        recv_frame(&mut self.inbound, self.recv_timeout).await
    }

    async fn close(&mut self) {
        // Dropping the sender ends the peer's inbound queue.
        self.outbound = None;
        self.inbound.close();
    }

    fn is_closed(&self) -> bool {
        self.outbound.is_none()
    }
}
