//! # switchboard-transport
//!
//! Transport abstraction layer for the Switchboard channel router.
//!
//! This crate provides a unified interface over the ways a connection can
//! reach the router:
//!
//! - **WebSocket** - a bound listener accepting WebSocket handshakes
//! - **Upgrade** - sockets already upgraded by an axum server
//! - **Memory** - channel-backed connections, no network involved
//!
//! ## Transport Abstraction
//!
//! All transports implement the `Transport` and `Connection` traits,
//! allowing the router to be protocol-agnostic.
//!
//! ```rust,ignore
//! use switchboard_transport::{Transport, Connection};
//!
//! async fn handle_connection(mut conn: Box<dyn Connection>) {
//!     while let Ok(Some(frame)) = conn.recv().await {
//!         // Route frame
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;
pub mod upgrade;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryClient, MemoryConnection, MemoryConnector, MemoryTransport};
pub use traits::{
    Connection, ConnectionId, ConnectionState, Transport, TransportError, DEFAULT_MAX_MESSAGE_SIZE,
};
pub use upgrade::UpgradedConnection;

#[cfg(feature = "websocket")]
pub use websocket::{
    ListenerConfig, WebSocketConnection, WebSocketTransport, DEFAULT_HANDSHAKE_TIMEOUT,
};
