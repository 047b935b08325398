//! WebSocket transport.

use crate::config::{SyncConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECV_TIMEOUT};
use crate::error::{SyncError, SyncResult};
use crate::transport::{recv_frame, Connector, SyncTransport};
use async_trait::async_trait;
use attsync_protocol::SyncMessage;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::debug;

/// How long `close` waits for queued frames to flush.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// A [`SyncTransport`] over one WebSocket connection.
///
/// A writer task drains the outbound queue into the socket and a reader task
/// forwards text frames into the inbound queue.
pub struct WsTransport {
    outbound: Option<mpsc::UnboundedSender<Message>>,
    inbound: mpsc::UnboundedReceiver<String>,
    recv_timeout: Duration,
    writer: Option<JoinHandle<()>>,
    reader: JoinHandle<()>,
}

impl WsTransport {
    /// Wraps an established WebSocket stream. Works for both client and
    /// server sides.
    pub fn from_stream<S>(ws: WebSocketStream<S>, recv_timeout: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut stream) = ws.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = sink.send(frame).await {
                    debug!(error = %e, "websocket write failed");
                    return;
                }
            }
            let _ = sink.close().await;
        });

        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            debug!("dropping non-utf8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(error = %e, "websocket read failed");
                        break;
                    }
                };
                if in_tx.send(text).is_err() {
                    break;
                }
            }
        });

        Self {
            outbound: Some(out_tx),
            inbound: in_rx,
            recv_timeout,
            writer: Some(writer),
            reader,
        }
    }
}

#[async_trait]
impl SyncTransport for WsTransport {
    fn send(&mut self, message: &SyncMessage) -> SyncResult<()> {
        let tx = self.outbound.as_ref().ok_or(SyncError::ChannelClosed)?;
        let text = message.encode()?;
        tx.send(Message::Text(text))
            .map_err(|_| SyncError::ChannelClosed)
    }

    async fn receive(&mut self) -> SyncResult<SyncMessage> {
        if self.outbound.is_none() {
            return Err(SyncError::ChannelClosed);
        }
        recv_frame(&mut self.inbound, self.recv_timeout).await
    }

    async fn close(&mut self) {
        if self.outbound.take().is_none() {
            return;
        }
        // The writer flushes what is queued, then sends a close frame.
        if let Some(writer) = self.writer.take() {
            let _ = tokio::time::timeout(CLOSE_GRACE, writer).await;
        }
        self.reader.abort();
        self.inbound.close();
    }

    fn is_closed(&self) -> bool {
        self.outbound.is_none()
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("closed", &self.is_closed())
            .field("recv_timeout", &self.recv_timeout)
            .finish()
    }
}

/// Connects to a peer's sync endpoint over WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
    recv_timeout: Duration,
}

impl WsConnector {
    /// Creates a connector with the default timeouts.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
        }
    }

    /// Creates a connector for the configured endpoint and timeouts.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            url: config.endpoint.clone(),
            connect_timeout: config.connect_timeout,
            recv_timeout: config.recv_timeout,
        }
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the receive timeout of produced transports.
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self) -> SyncResult<WsTransport> {
        debug!(url = %self.url, "connecting");
        let (ws, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
                .await
                .map_err(|_| SyncError::ConnectTimeout)?
                .map_err(|e| SyncError::Transport(format!("ws connect {}: {e}", self.url)))?;
        Ok(WsTransport::from_stream(ws, self.recv_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attsync_core::Digest;
    use attsync_protocol::{Done, Hello};
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        (listener, url)
    }

    #[tokio::test]
    async fn round_trip_and_close() {
        let (listener, url) = listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let mut transport = WsTransport::from_stream(ws, Duration::from_secs(5));

            let hello = transport.receive().await.unwrap();
            transport
                .send(&SyncMessage::Done(Done::new(0, 0)))
                .unwrap();
            let after_close = transport.receive().await;
            transport.close().await;
            (hello, after_close)
        });

        let mut client = WsConnector::new(url).connect().await.unwrap();
        client
            .send(&SyncMessage::Hello(Hello::new(Digest::ZERO, "client")))
            .unwrap();
        assert_eq!(
            client.receive().await.unwrap(),
            SyncMessage::Done(Done::new(0, 0))
        );
        client.close().await;
        client.close().await;
        assert!(client.is_closed());

        let (hello, after_close) = server.await.unwrap();
        assert!(matches!(hello, SyncMessage::Hello(h) if h.peer_name == "client"));
        assert!(matches!(after_close, Err(SyncError::ChannelClosed)));
    }

    #[tokio::test]
    async fn handshake_that_never_completes_times_out() {
        let (listener, url) = listener().await;
        // Accept TCP but never answer the upgrade.
        let _hold = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(stream);
        });

        let err = WsConnector::new(url)
            .with_connect_timeout(Duration::from_millis(200))
            .connect()
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ConnectTimeout));
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let (listener, url) = listener().await;
        drop(listener);

        let err = WsConnector::new(url).connect().await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
    }
}
