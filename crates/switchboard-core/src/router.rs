//! Message router for Switchboard.
//!
//! The router owns the connection registry and the handler directory. For
//! every inbound frame it decodes the message, looks up the handler for the
//! sender's channel and message type, runs it, passes the output through the
//! process step and writes the result back to the sender only.

use crate::channel::{resolve_channel, ChannelId};
use crate::handler::{HandlerDirectory, HandlerError, Passthrough, Process};
use crate::metrics;
use crate::registry::{ConnectionRegistry, RegistryConfig};
use crate::reply::send_reply;
use futures_util::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use switchboard_protocol::{codec, ProtocolError};
use switchboard_transport::{Connection, ConnectionId, TransportError};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Frame could not be decoded into a message.
    #[error("Malformed message: {0}")]
    Malformed(#[from] ProtocolError),

    /// Reply could not be encoded.
    #[error("Failed to encode reply: {0}")]
    Encode(ProtocolError),

    /// Message arrived on a connection that carries no channel tag.
    #[error("Connection {0} is not registered")]
    UnregisteredConnection(ConnectionId),

    /// Connection was accepted twice.
    #[error("Connection {connection} is already registered on channel {channel}")]
    AlreadyRegistered {
        /// The connection.
        connection: ConnectionId,
        /// The channel it already belongs to.
        channel: ChannelId,
    },

    /// Handler or process step returned an error.
    #[error("Handler for {channel}/{message_type} failed: {source}")]
    Handler {
        /// Channel of the sender.
        channel: ChannelId,
        /// Message type.
        message_type: String,
        /// Error returned by the handler.
        source: HandlerError,
    },

    /// Handler or process step panicked.
    #[error("Handler for {channel}/{message_type} panicked")]
    HandlerPanicked {
        /// Channel of the sender.
        channel: ChannelId,
        /// Message type.
        message_type: String,
    },

    /// Transport failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Router configuration.
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    /// Registry behaviour.
    pub registry: RegistryConfig,
}

/// The message router.
pub struct Router {
    registry: ConnectionRegistry,
    directory: Arc<HandlerDirectory>,
    process: Arc<dyn Process>,
}

impl Router {
    /// Create a router with default configuration.
    #[must_use]
    pub fn new(directory: HandlerDirectory) -> Self {
        Self::with_config(directory, RouterConfig::default())
    }

    /// Create a router with custom configuration.
    #[must_use]
    pub fn with_config(directory: HandlerDirectory, config: RouterConfig) -> Self {
        info!(
            handlers = directory.len(),
            "Creating router with config: {:?}", config
        );

        Self {
            registry: ConnectionRegistry::with_config(config.registry),
            directory: Arc::new(directory),
            process: Arc::new(Passthrough),
        }
    }

    /// Replace the process step applied to every handler output.
    #[must_use]
    pub fn with_process(mut self, process: impl Process + 'static) -> Self {
        self.process = Arc::new(process);
        self
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// The handler directory.
    #[must_use]
    pub fn directory(&self) -> &HandlerDirectory {
        &self.directory
    }

    /// Pin a new connection to the channel named by its request target.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::AlreadyRegistered`] if the connection was
    /// accepted before.
    pub fn accept<C>(&self, connection: &C) -> Result<ChannelId, RouterError>
    where
        C: Connection + ?Sized,
    {
        let channel = resolve_channel(connection.request_target());
        self.registry.register(connection.id(), channel.clone())?;
        Ok(channel)
    }

    /// Route one frame received on `connection_id`.
    ///
    /// Returns the reply to send back, or `None` when there is nothing to
    /// send: no handler matched, or the handler and process step produced
    /// an empty result (see [`is_empty_result`]).
    ///
    /// # Errors
    ///
    /// Fails if the frame is not a valid message, the connection has no
    /// channel tag, or the handler fails or panics.
    pub async fn dispatch(
        &self,
        connection_id: ConnectionId,
        frame: &[u8],
    ) -> Result<Option<Value>, RouterError> {
        let message = codec::decode(frame)?;

        let channel = self
            .registry
            .tag_of(connection_id)
            .ok_or(RouterError::UnregisteredConnection(connection_id))?;

        let descriptor = match self.directory.find(&channel, message.message_type()) {
            Some(descriptor) => descriptor,
            None => {
                trace!(
                    connection = %connection_id,
                    channel = %channel,
                    message_type = %message.message_type(),
                    "No handler registered"
                );
                return Ok(None);
            }
        };

        let message_type = message.message_type.clone();
        let process = Arc::clone(&self.process);
        let invoke = async move {
            let output = descriptor.callback.call(message).await?;
            process.process(output).await
        };

        let reply = match AssertUnwindSafe(invoke).catch_unwind().await {
            Ok(Ok(reply)) => reply,
            Ok(Err(source)) => {
                return Err(RouterError::Handler {
                    channel,
                    message_type,
                    source,
                })
            }
            Err(_) => {
                return Err(RouterError::HandlerPanicked {
                    channel,
                    message_type,
                })
            }
        };

        Ok(reply.filter(|value| !is_empty_result(value)))
    }

    /// Serve a connection until it closes.
    ///
    /// Frames are handled one at a time, so replies leave in the order the
    /// messages arrived. A bad message only drops that message. The
    /// connection is released from the registry however the loop ends.
    ///
    /// # Errors
    ///
    /// Returns an error if receiving fails or a reply cannot be written.
    pub async fn serve<C>(&self, connection: &mut C) -> Result<(), RouterError>
    where
        C: Connection + ?Sized,
    {
        let connection_id = connection.id();
        let _registration = Registration {
            registry: &self.registry,
            connection_id,
        };

        debug!(connection = %connection_id, "Serving connection");

        loop {
            let frame = match connection.recv().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!(connection = %connection_id, "Connection closed");
                    return Ok(());
                }
                Err(TransportError::FrameTooLarge { size, limit }) => {
                    debug!(
                        connection = %connection_id,
                        size,
                        limit,
                        "Dropping oversized frame"
                    );
                    metrics::record_outcome(metrics::OUTCOME_MALFORMED);
                    continue;
                }
                Err(e) => {
                    warn!(connection = %connection_id, error = %e, "Receive failed");
                    return Err(e.into());
                }
            };

            match self.dispatch(connection_id, &frame).await {
                Ok(Some(reply)) => {
                    metrics::record_outcome(metrics::OUTCOME_REPLIED);
                    if let Err(e) = send_reply(connection, &reply).await {
                        warn!(connection = %connection_id, error = %e, "Failed to send reply");
                        return Err(e);
                    }
                }
                Ok(None) => {
                    metrics::record_outcome(metrics::OUTCOME_NO_REPLY);
                }
                Err(e) => report(connection_id, &e),
            }
        }
    }
}

/// Whether a handler result counts as "nothing to send".
///
/// `null`, `false`, zero and the empty string are empty. Arrays and objects
/// never are, even when they have no elements.
pub fn is_empty_result(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Log and count a failed dispatch. The connection stays open.
fn report(connection_id: ConnectionId, err: &RouterError) {
    match err {
        RouterError::Malformed(_) => {
            debug!(connection = %connection_id, error = %err, "Dropping malformed message");
            metrics::record_outcome(metrics::OUTCOME_MALFORMED);
        }
        RouterError::Handler { .. } | RouterError::HandlerPanicked { .. } => {
            warn!(connection = %connection_id, error = %err, "Handler failed");
            metrics::record_outcome(metrics::OUTCOME_FAILED);
            metrics::record_handler_error();
        }
        _ => {
            error!(connection = %connection_id, error = %err, "Dispatch failed");
            metrics::record_outcome(metrics::OUTCOME_FAILED);
        }
    }
}

/// Releases a connection from the registry when dropped.
struct Registration<'a> {
    registry: &'a ConnectionRegistry,
    connection_id: ConnectionId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.unregister(self.connection_id);
    }
}
