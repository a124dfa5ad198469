//! # switchboard-core
//!
//! Channel resolution, connection registry and message routing for the
//! Switchboard router.
//!
//! This crate provides the building blocks:
//!
//! - **Channel** - resolve the channel a connection belongs to from its path
//! - **Registry** - track live connections and their channel tags
//! - **Handler** - the `(channel, type) -> handler` directory
//! - **Router** - decode, dispatch and reply, one connection at a time
//! - **Acceptor** - drive a transport and serve every connection it yields
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│   Router    │────▶│  Handler    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │                   │
//!        │                   ▼                   ▼
//!        │            ┌─────────────┐     ┌─────────────┐
//!        │            │  Registry   │     │   Process   │
//!        │            └─────────────┘     └─────────────┘
//!        │                                       │
//!        └──────────────── reply ◀───────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use switchboard_core::{Acceptor, HandlerDirectory, HandlerResult, Router};
//! use switchboard_protocol::InboundMessage;
//! use switchboard_transport::{ListenerConfig, WebSocketTransport};
//!
//! async fn on_move(msg: InboundMessage) -> HandlerResult {
//!     Ok(Some(serde_json::json!({ "ok": true, "dx": msg.get("dx") })))
//! }
//!
//! let directory = HandlerDirectory::builder()
//!     .route("game42", "move", on_move)
//!     .build();
//! let router = Arc::new(Router::new(directory));
//! let transport = WebSocketTransport::bind(ListenerConfig::new(8080)).await?;
//! Acceptor::new(router).run(&transport).await;
//! ```

pub mod acceptor;
pub mod channel;
pub mod handler;
pub mod metrics;
pub mod registry;
pub mod reply;
pub mod router;

pub use acceptor::{Acceptor, ConnectionInfo};
pub use channel::{resolve_channel, ChannelId, DEFAULT_CHANNEL};
pub use handler::{
    Handler, HandlerDescriptor, HandlerDirectory, HandlerDirectoryBuilder, HandlerError,
    HandlerResult, Passthrough, Process,
};
pub use registry::{ConnectionRegistry, RegistryConfig, RegistryStats};
pub use reply::send_reply;
pub use router::{is_empty_result, Router, RouterConfig, RouterError};
