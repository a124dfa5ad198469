//! Handler directory.
//!
//! The application registers one handler per (channel, message type) pair
//! before any connection is accepted. The router only ever reads the
//! directory: it scans it in registration order and picks the first match.

use crate::channel::ChannelId;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use switchboard_protocol::InboundMessage;
use tracing::{debug, warn};

/// Error returned by a handler or by the process step.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a handler or of the process step. `None` means "no reply".
pub type HandlerResult = Result<Option<Value>, HandlerError>;

/// A message handler.
///
/// Any `Fn(InboundMessage) -> impl Future<Output = HandlerResult>` closure is
/// a handler.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one decoded message.
    async fn call(&self, message: InboundMessage) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(InboundMessage) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, message: InboundMessage) -> HandlerResult {
        (self)(message).await
    }
}

/// Transform applied to a handler's output before it is sent.
///
/// The router always runs it after a matched handler, and what it returns
/// (not the handler's raw output) is what gets encoded.
#[async_trait]
pub trait Process: Send + Sync {
    /// Turn the handler output into the final reply.
    async fn process(&self, output: Option<Value>) -> HandlerResult;
}

/// Process step that returns the handler output unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

#[async_trait]
impl Process for Passthrough {
    async fn process(&self, output: Option<Value>) -> HandlerResult {
        Ok(output)
    }
}

/// One entry of the directory.
#[derive(Clone)]
pub struct HandlerDescriptor {
    /// Channel the handler serves.
    pub channel: ChannelId,
    /// Message type the handler serves.
    pub message_type: String,
    /// The callback.
    pub callback: Arc<dyn Handler>,
}

impl HandlerDescriptor {
    /// Create a descriptor.
    pub fn new(
        channel: impl Into<ChannelId>,
        message_type: impl Into<String>,
        callback: impl Handler + 'static,
    ) -> Self {
        Self {
            channel: channel.into(),
            message_type: message_type.into(),
            callback: Arc::new(callback),
        }
    }

    /// Check whether this descriptor serves the given pair.
    #[must_use]
    pub fn matches(&self, channel: &str, message_type: &str) -> bool {
        self.channel == channel && self.message_type == message_type
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("channel", &self.channel)
            .field("message_type", &self.message_type)
            .finish_non_exhaustive()
    }
}

/// Ordered, immutable collection of handler descriptors.
#[derive(Debug, Default, Clone)]
pub struct HandlerDirectory {
    entries: Vec<HandlerDescriptor>,
}

impl HandlerDirectory {
    /// Start building a directory.
    #[must_use]
    pub fn builder() -> HandlerDirectoryBuilder {
        HandlerDirectoryBuilder::default()
    }

    /// Build a directory from a list of descriptors, keeping their order.
    #[must_use]
    pub fn from_descriptors(entries: Vec<HandlerDescriptor>) -> Self {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert((entry.channel.as_str(), entry.message_type.as_str())) {
                warn!(
                    channel = %entry.channel,
                    message_type = %entry.message_type,
                    "Duplicate handler is shadowed by an earlier registration"
                );
            }
        }

        debug!(handlers = entries.len(), "Handler directory built");
        Self { entries }
    }

    /// Find the first handler registered for `(channel, message_type)`.
    #[must_use]
    pub fn find(&self, channel: &str, message_type: &str) -> Option<&HandlerDescriptor> {
        self.entries
            .iter()
            .find(|entry| entry.matches(channel, message_type))
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.entries.iter()
    }
}

/// Builder for [`HandlerDirectory`].
#[derive(Default)]
pub struct HandlerDirectoryBuilder {
    entries: Vec<HandlerDescriptor>,
}

impl HandlerDirectoryBuilder {
    /// Register a handler for `(channel, message_type)`.
    #[must_use]
    pub fn route(
        mut self,
        channel: impl Into<ChannelId>,
        message_type: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> Self {
        self.entries
            .push(HandlerDescriptor::new(channel, message_type, handler));
        self
    }

    /// Register a prebuilt descriptor.
    #[must_use]
    pub fn descriptor(mut self, descriptor: HandlerDescriptor) -> Self {
        self.entries.push(descriptor);
        self
    }

    /// Freeze the directory.
    #[must_use]
    pub fn build(self) -> HandlerDirectory {
        HandlerDirectory::from_descriptors(self.entries)
    }
}
