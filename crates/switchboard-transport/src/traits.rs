//! Transport abstraction traits for Switchboard.
//!
//! These traits define the interface that all transport implementations must provide,
//! allowing the router to be transport-agnostic.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Default maximum inbound message size (64 KB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
///
/// Identifiers are allocated from a process-wide counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw numeric value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Ready to exchange messages.
    Open,
    /// Close initiated, waiting for the peer.
    Closing,
    /// Connection terminated.
    Closed,
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Inbound frame exceeds the configured limit.
    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// The listener will not produce further connections.
    #[error("Listener closed")]
    ListenerClosed,

    /// WebSocket handshake failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// A transport that can accept connections.
///
/// Transports are responsible for handling the underlying protocol
/// and providing a uniform interface.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Accept a new connection.
    ///
    /// This method blocks until a new connection is available or an error occurs.
    /// Errors concern a single connection attempt and callers may keep
    /// accepting, except [`TransportError::ListenerClosed`].
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError>;

    /// Get the transport name (e.g., "websocket", "memory").
    fn name(&self) -> &'static str;
}

/// An active connection over a transport.
///
/// A connection is owned by a single task, which reads inbound data frames
/// and writes replies in turn.
#[async_trait]
pub trait Connection: Send {
    /// Get the connection's unique identifier.
    fn id(&self) -> ConnectionId;

    /// The request target the client opened the connection with (e.g. `/game42`).
    fn request_target(&self) -> &str;

    /// Receive the payload of the next data frame.
    ///
    /// Control frames are handled internally. Returns `None` once the
    /// connection is closed cleanly.
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Send a text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Check if the connection is still open.
    fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }
}
