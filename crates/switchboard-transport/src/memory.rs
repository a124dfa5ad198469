//! In-memory transport.
//!
//! Connections backed by tokio channels instead of sockets. Used to drive the
//! router without a network, and by embedders that bridge another transport
//! into Switchboard.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

use crate::traits::{Connection, ConnectionId, ConnectionState, Transport, TransportError};

/// Create a connected pair: the server side and the client handle.
#[must_use]
pub fn pair(target: impl Into<String>) -> (MemoryConnection, MemoryClient) {
    let (to_server, inbound) = mpsc::unbounded_channel();
    let (outbound, from_server) = mpsc::unbounded_channel();

    let connection = MemoryConnection {
        id: ConnectionId::generate(),
        target: target.into(),
        inbound,
        outbound,
        state: ConnectionState::Open,
    };
    let client = MemoryClient {
        to_server: Some(to_server),
        from_server,
    };

    (connection, client)
}

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    target: String,
    inbound: mpsc::UnboundedReceiver<Bytes>,
    outbound: mpsc::UnboundedSender<String>,
    state: ConnectionState,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn request_target(&self) -> &str {
        &self.target
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        if self.state == ConnectionState::Closed {
            return Ok(None);
        }

        match self.inbound.recv().await {
            Some(frame) => Ok(Some(frame)),
            None => {
                self.state = ConnectionState::Closed;
                Ok(None)
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if self.state != ConnectionState::Open {
            return Err(TransportError::ConnectionClosed);
        }

        self.outbound
            .send(text)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inbound.close();
        self.state = ConnectionState::Closed;
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }
}

/// Client side of an in-memory connection.
pub struct MemoryClient {
    to_server: Option<mpsc::UnboundedSender<Bytes>>,
    from_server: mpsc::UnboundedReceiver<String>,
}

impl MemoryClient {
    /// Send a text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if either side has closed the connection.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        let text: String = text.into();
        self.send_binary(text.into_bytes())
    }

    /// Send a binary frame to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if either side has closed the connection.
    pub fn send_binary(&self, data: impl Into<Bytes>) -> Result<(), TransportError> {
        let tx = self
            .to_server
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)?;
        tx.send(data.into())
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Wait for the next frame from the server.
    ///
    /// Returns `None` once the server side is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_server.recv().await
    }

    /// Take the next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_server.try_recv().ok()
    }

    /// Close the client side. The server sees end-of-stream.
    pub fn close(&mut self) {
        self.to_server = None;
    }
}

/// Create a transport and the connector that feeds it.
#[must_use]
pub fn transport() -> (MemoryTransport, MemoryConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryTransport {
            incoming: Mutex::new(rx),
        },
        MemoryConnector { tx },
    )
}

/// A transport whose connections are opened through a [`MemoryConnector`].
pub struct MemoryTransport {
    incoming: Mutex<mpsc::UnboundedReceiver<MemoryConnection>>,
}

/// Opens connections on a [`MemoryTransport`].
#[derive(Clone)]
pub struct MemoryConnector {
    tx: mpsc::UnboundedSender<MemoryConnection>,
}

impl MemoryConnector {
    /// Open a connection to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport has been dropped.
    pub fn connect(&self, target: impl Into<String>) -> Result<MemoryClient, TransportError> {
        let (connection, client) = pair(target);
        self.tx
            .send(connection)
            .map_err(|_| TransportError::ListenerClosed)?;
        Ok(client)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError> {
        let mut incoming = self.incoming.lock().await;
        match incoming.recv().await {
            Some(connection) => Ok(Box::new(connection)),
            None => Err(TransportError::ListenerClosed),
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_roundtrip() {
        let (mut conn, mut client) = pair("/room");
        assert_eq!(conn.request_target(), "/room");
        assert!(conn.is_open());

        client.send_text("ping").unwrap();
        assert_eq!(&conn.recv().await.unwrap().unwrap()[..], b"ping");

        conn.send("pong".to_string()).await.unwrap();
        assert_eq!(client.recv().await.as_deref(), Some("pong"));
        assert!(client.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_client_close_ends_stream() {
        let (mut conn, mut client) = pair("/");
        client.send_text("last").unwrap();
        client.close();

        assert!(conn.recv().await.unwrap().is_some());
        assert!(conn.recv().await.unwrap().is_none());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(matches!(
            conn.send("late".to_string()).await,
            Err(TransportError::ConnectionClosed)
        ));
        assert!(client.send_text("again").is_err());
    }

    #[tokio::test]
    async fn test_server_drop_ends_client() {
        let (conn, mut client) = pair("/");
        drop(conn);
        assert!(client.recv().await.is_none());
        assert!(client.send_text("orphan").is_err());
    }

    #[tokio::test]
    async fn test_transport_accepts_in_order() {
        let (transport, connector) = transport();
        let _a = connector.connect("/a").unwrap();
        let _b = connector.connect("/b").unwrap();

        let first = transport.accept().await.unwrap();
        let second = transport.accept().await.unwrap();
        assert_eq!(first.request_target(), "/a");
        assert_eq!(second.request_target(), "/b");
        assert_ne!(first.id(), second.id());
        assert_eq!(transport.name(), "memory");
    }

    #[tokio::test]
    async fn test_transport_closes_without_connectors() {
        let (transport, connector) = transport();
        drop(connector);
        assert!(matches!(
            transport.accept().await,
            Err(TransportError::ListenerClosed)
        ));
    }
}
