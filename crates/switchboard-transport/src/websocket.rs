//! WebSocket transport implementation.
//!
//! This module provides the listener bootstrap: a WebSocket transport over a
//! bound TCP listener using tokio-tungstenite. The request target of every
//! handshake is captured so the router can resolve the connection's channel.
//!
//! Handshakes run on their own tasks under a timeout, so a client that opens
//! a TCP connection and never upgrades does not hold up anyone else.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        Error as WsError, Message,
    },
    WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::traits::{
    Connection, ConnectionId, ConnectionState, Transport, TransportError, DEFAULT_MAX_MESSAGE_SIZE,
};

/// Default time a client gets to complete the WebSocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Host to bind to. `None` binds the IPv6 wildcard address.
    pub host: Option<IpAddr>,
    /// Port to listen on.
    pub port: u16,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
    /// Time allowed for the WebSocket handshake.
    pub handshake_timeout: Duration,
}

impl ListenerConfig {
    /// Listen on the wildcard address at `port`.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            host: None,
            port,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Listen on `port`, on the same host an existing server is bound to.
    #[must_use]
    pub fn reuse_host(existing: SocketAddr, port: u16) -> Self {
        Self {
            host: Some(existing.ip()),
            ..Self::new(port)
        }
    }

    /// Set the host to bind to.
    #[must_use]
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = Some(host);
        self
    }

    /// Set the maximum inbound message size.
    #[must_use]
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Get the socket address to bind to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V6(Ipv6Addr::UNSPECIFIED));
        SocketAddr::new(host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::new(8080)
    }
}

/// WebSocket transport.
pub struct WebSocketTransport {
    listener: TcpListener,
    max_message_size: usize,
    handshake_timeout: Duration,
    ready_tx: mpsc::UnboundedSender<WebSocketConnection>,
    ready_rx: Mutex<mpsc::UnboundedReceiver<WebSocketConnection>>,
}

impl WebSocketTransport {
    /// Bind a new WebSocket transport.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn bind(config: ListenerConfig) -> Result<Self, TransportError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(addr).await.map_err(TransportError::Io)?;

        info!("WebSocket transport listening on {}", addr);

        Ok(Self::from_listener(listener)
            .with_max_message_size(config.max_message_size)
            .with_handshake_timeout(config.handshake_timeout))
    }

    /// Wrap an already-bound listener.
    #[must_use]
    pub fn from_listener(listener: TcpListener) -> Self {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        Self {
            listener,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            ready_tx,
            ready_rx: Mutex::new(ready_rx),
        }
    }

    /// Set the maximum inbound message size.
    #[must_use]
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Get the local address this transport is bound to.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Run the handshake for `stream` on its own task. Upgraded connections
    /// are queued for [`Transport::accept`].
    fn spawn_handshake(&self, stream: TcpStream, addr: SocketAddr) {
        let ready = self.ready_tx.clone();
        let max_message_size = self.max_message_size;
        let timeout = self.handshake_timeout;

        tokio::spawn(async move {
            let upgrade = upgrade_to_websocket(stream, addr, max_message_size);
            match tokio::time::timeout(timeout, upgrade).await {
                Ok(Ok(conn)) => {
                    // Only fails once the transport is gone.
                    let _ = ready.send(conn);
                }
                // Failure already logged by the upgrade.
                Ok(Err(_)) => {}
                Err(_) => warn!("WebSocket handshake with {} timed out", addr),
            }
        });
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError> {
        let mut ready = self.ready_rx.lock().await;

        loop {
            tokio::select! {
                Some(conn) = ready.recv() => return Ok(Box::new(conn)),
                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted.map_err(TransportError::Io)?;
                    debug!("Accepted TCP connection from {}", addr);
                    self.spawn_handshake(stream, addr);
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A WebSocket connection accepted by [`WebSocketTransport`].
pub struct WebSocketConnection {
    id: ConnectionId,
    stream: WebSocketStream<TcpStream>,
    target: String,
    remote_addr: SocketAddr,
    state: ConnectionState,
    max_message_size: usize,
}

impl WebSocketConnection {
    fn new(
        stream: WebSocketStream<TcpStream>,
        target: String,
        remote_addr: SocketAddr,
        max_message_size: usize,
    ) -> Self {
        Self {
            id: ConnectionId::generate(),
            stream,
            target,
            remote_addr,
            state: ConnectionState::Open,
            max_message_size,
        }
    }

    fn check_size(&self, len: usize) -> Result<(), TransportError> {
        if len > self.max_message_size {
            warn!(
                connection = %self.id,
                "Message too large: {} bytes (max: {})",
                len,
                self.max_message_size
            );
            return Err(TransportError::FrameTooLarge {
                size: len,
                limit: self.max_message_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn request_target(&self) -> &str {
        &self.target
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.check_size(text.len())?;
                    return Ok(Some(Bytes::from(text.into_bytes())));
                }
                Some(Ok(Message::Binary(data))) => {
                    self.check_size(data.len())?;
                    return Ok(Some(Bytes::from(data)));
                }
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite queues the pong; flush it out
                    if let Err(e) = self.stream.flush().await {
                        warn!(connection = %self.id, "Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    debug!(connection = %self.id, "Received close frame");
                    self.state = ConnectionState::Closed;
                    return Ok(None);
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    debug!(connection = %self.id, "Connection closed");
                    self.state = ConnectionState::Closed;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    warn!(connection = %self.id, "WebSocket error: {}", e);
                    self.state = ConnectionState::Closed;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    self.state = ConnectionState::Closed;
                    return Ok(None);
                }
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if self.state != ConnectionState::Open {
            return Err(TransportError::ConnectionClosed);
        }

        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }

        self.state = ConnectionState::Closing;
        let result = self
            .stream
            .close(None)
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)));
        self.state = ConnectionState::Closed;
        result
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn remote_addr(&self) -> Option<String> {
        Some(self.remote_addr.to_string())
    }
}

/// Perform the WebSocket handshake on an accepted TCP stream.
///
/// The request target (path and query) of the upgrade request is recorded
/// on the returned connection.
///
/// # Errors
///
/// Returns an error if the handshake fails.
pub async fn upgrade_to_websocket(
    stream: TcpStream,
    remote_addr: SocketAddr,
    max_message_size: usize,
) -> Result<WebSocketConnection, TransportError> {
    let mut target = String::new();

    let ws_stream = accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            target = request.uri().to_string();
            Ok(response)
        },
    )
    .await
    .map_err(|e| {
        warn!("WebSocket handshake with {} failed: {}", remote_addr, e);
        TransportError::Handshake(e.to_string())
    })?;

    debug!(target = %target, "WebSocket handshake completed with {}", remote_addr);

    Ok(WebSocketConnection::new(
        ws_stream,
        target,
        remote_addr,
        max_message_size,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio_tungstenite::connect_async;

    #[test]
    fn test_listener_config_default() {
        let config = ListenerConfig::default();
        assert_eq!(config.bind_addr().port(), 8080);
        assert_eq!(
            config.bind_addr().ip(),
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        );
        assert_eq!(config.max_message_size, 64 * 1024);
    }

    #[test]
    fn test_listener_config_reuse_host() {
        let existing: SocketAddr = "10.0.0.7:3000".parse().unwrap();
        let config = ListenerConfig::reuse_host(existing, 3001);
        assert_eq!(config.bind_addr(), "10.0.0.7:3001".parse().unwrap());
    }

    #[tokio::test]
    async fn test_accept_captures_request_target() {
        let config = ListenerConfig::new(0).with_host("127.0.0.1".parse().unwrap());
        let transport = WebSocketTransport::bind(config).await.unwrap();
        let addr = transport.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let (mut ws, _) = connect_async(format!("ws://{}/lobby?team=red", addr))
                .await
                .unwrap();
            ws.send(Message::Text("hello".into())).await.unwrap();
            ws
        });

        let mut conn = transport.accept().await.unwrap();
        assert_eq!(conn.request_target(), "/lobby?team=red");
        assert!(conn.is_open());

        let frame = conn.recv().await.unwrap().unwrap();
        assert_eq!(&frame[..], b"hello");

        let _ws = client.await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let config = ListenerConfig::new(0)
            .with_host("127.0.0.1".parse().unwrap())
            .with_max_message_size(4);
        let transport = WebSocketTransport::bind(config).await.unwrap();
        let addr = transport.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let (mut ws, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();
            ws.send(Message::Text("too long".into())).await.unwrap();
            ws.send(Message::Text("ok".into())).await.unwrap();
            ws
        });

        let mut conn = transport.accept().await.unwrap();
        assert!(matches!(
            conn.recv().await,
            Err(TransportError::FrameTooLarge { size: 8, limit: 4 })
        ));
        let frame = conn.recv().await.unwrap().unwrap();
        assert_eq!(&frame[..], b"ok");

        let _ws = client.await.unwrap();
    }

    #[tokio::test]
    async fn test_stalled_handshake_times_out() {
        let config = ListenerConfig::new(0)
            .with_host("127.0.0.1".parse().unwrap())
            .with_handshake_timeout(Duration::from_millis(100));
        let transport = WebSocketTransport::bind(config).await.unwrap();
        let addr = transport.local_addr().unwrap();

        let mut idle = TcpStream::connect(addr).await.unwrap();
        let accepted = tokio::time::timeout(Duration::from_millis(500), transport.accept()).await;
        assert!(accepted.is_err());

        // The server drops the socket once the handshake times out.
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(2), idle.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}
