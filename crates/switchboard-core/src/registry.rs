//! Connection registry.
//!
//! Tracks which connections live on which channel and keeps the channel tag
//! of every connection so the router can look it up when a message arrives.

use crate::channel::{ChannelId, DEFAULT_CHANNEL};
use crate::router::RouterError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use switchboard_transport::ConnectionId;
use tracing::{debug, trace};

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Whether to drop a channel entry once its last connection leaves.
    /// The default channel is always kept.
    pub prune_empty_channels: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            prune_empty_channels: true,
        }
    }
}

/// Live connections grouped by channel.
pub struct ConnectionRegistry {
    /// Channel name -> connections in accept order.
    channels: DashMap<ChannelId, Vec<ConnectionId>>,
    /// Connection -> channel tag.
    tags: DashMap<ConnectionId, ChannelId>,
    config: RegistryConfig,
}

impl ConnectionRegistry {
    /// Create an empty registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        let channels = DashMap::new();
        channels.insert(DEFAULT_CHANNEL.to_string(), Vec::new());

        Self {
            channels,
            tags: DashMap::new(),
            config,
        }
    }

    /// Register a connection on a channel and record its tag.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::AlreadyRegistered`] if the connection already
    /// carries a tag. Its tag never changes once assigned.
    pub fn register(
        &self,
        connection_id: ConnectionId,
        channel: impl Into<ChannelId>,
    ) -> Result<(), RouterError> {
        let channel = channel.into();

        match self.tags.entry(connection_id) {
            Entry::Occupied(existing) => {
                return Err(RouterError::AlreadyRegistered {
                    connection: connection_id,
                    channel: existing.get().clone(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(channel.clone());
            }
        }

        let mut members = self.channels.entry(channel.clone()).or_insert_with(|| {
            debug!(channel = %channel, "Creating new channel");
            Vec::new()
        });
        members.push(connection_id);

        debug!(
            channel = %channel,
            connection = %connection_id,
            members = members.len(),
            "Registered connection"
        );

        Ok(())
    }

    /// Get the channel a connection was registered on.
    #[must_use]
    pub fn tag_of(&self, connection_id: ConnectionId) -> Option<ChannelId> {
        self.tags.get(&connection_id).map(|tag| tag.clone())
    }

    /// Remove a connection from the registry.
    ///
    /// Returns the channel it was registered on, if any.
    pub fn unregister(&self, connection_id: ConnectionId) -> Option<ChannelId> {
        let (_, channel) = self.tags.remove(&connection_id)?;

        if let Some(mut members) = self.channels.get_mut(&channel) {
            members.retain(|id| *id != connection_id);
        }

        if self.config.prune_empty_channels && channel != DEFAULT_CHANNEL {
            let removed = self
                .channels
                .remove_if(&channel, |_, members| members.is_empty());
            if removed.is_some() {
                trace!(channel = %channel, "Deleted empty channel");
            }
        }

        debug!(channel = %channel, connection = %connection_id, "Unregistered connection");
        Some(channel)
    }

    /// Get the connections on a channel, in accept order.
    #[must_use]
    pub fn members(&self, channel: &str) -> Vec<ConnectionId> {
        self.channels
            .get(channel)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    /// Check if a channel entry exists.
    #[must_use]
    pub fn channel_exists(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Get all channel names.
    #[must_use]
    pub fn channel_names(&self) -> Vec<ChannelId> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            channel_count: self.channels.len(),
            connection_count: self.tags.len(),
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of channel entries.
    pub channel_count: usize,
    /// Number of registered connections.
    pub connection_count: usize,
}
