//! Adapter for WebSocket connections upgraded by axum.
//!
//! Lets an HTTP server that already owns the listening socket hand its
//! upgraded sockets to the router.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tracing::{debug, warn};

use crate::traits::{
    Connection, ConnectionId, ConnectionState, TransportError, DEFAULT_MAX_MESSAGE_SIZE,
};

/// A connection wrapping an axum [`WebSocket`].
pub struct UpgradedConnection {
    id: ConnectionId,
    socket: WebSocket,
    target: String,
    remote_addr: Option<SocketAddr>,
    state: ConnectionState,
    max_message_size: usize,
}

impl UpgradedConnection {
    /// Wrap an upgraded socket together with the request target it was opened on.
    #[must_use]
    pub fn new(socket: WebSocket, target: impl Into<String>) -> Self {
        Self {
            id: ConnectionId::generate(),
            socket,
            target: target.into(),
            remote_addr: None,
            state: ConnectionState::Open,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Record the peer address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Set the maximum inbound message size.
    #[must_use]
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    fn accept_frame(&self, data: Vec<u8>) -> Result<Option<Bytes>, TransportError> {
        if data.len() > self.max_message_size {
            warn!(
                connection = %self.id,
                "Message too large: {} bytes (max: {})",
                data.len(),
                self.max_message_size
            );
            return Err(TransportError::FrameTooLarge {
                size: data.len(),
                limit: self.max_message_size,
            });
        }
        Ok(Some(Bytes::from(data)))
    }
}

#[async_trait]
impl Connection for UpgradedConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn request_target(&self) -> &str {
        &self.target
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.socket.next().await {
                Some(Ok(Message::Text(text))) => return self.accept_frame(text.into_bytes()),
                Some(Ok(Message::Binary(data))) => return self.accept_frame(data),
                Some(Ok(Message::Ping(_))) => {
                    if let Err(e) = self.socket.flush().await {
                        warn!(connection = %self.id, "Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    debug!(connection = %self.id, "Received close frame");
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

        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }

        self.state = ConnectionState::Closing;
        let result = SinkExt::close(&mut self.socket)
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)));
        self.state = ConnectionState::Closed;
        result
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.map(|addr| addr.to_string())
    }
}
