//! Handlers built from `[[routes]]` configuration.

use crate::config::{RouteAction, RouteConfig};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use switchboard_core::{Handler, HandlerDirectory, HandlerResult};
use switchboard_protocol::InboundMessage;
use tracing::info;

/// Handler behind a configured route.
#[derive(Debug, Clone)]
pub enum Responder {
    /// Send the inbound message back.
    Echo,
    /// Send a fixed value.
    Reply(Value),
    /// Send nothing.
    Silent,
}

impl Responder {
    fn from_config(route: &RouteConfig) -> Result<Self> {
        Ok(match (route.action, &route.value) {
            (RouteAction::Echo, _) => Self::Echo,
            (RouteAction::Silent, _) => Self::Silent,
            (RouteAction::Reply, Some(value)) => Self::Reply(value.clone()),
            (RouteAction::Reply, None) => bail!(
                "Route {}/{} uses action \"reply\" without a value",
                route.channel,
                route.message_type
            ),
        })
    }
}

#[async_trait]
impl Handler for Responder {
    async fn call(&self, message: InboundMessage) -> HandlerResult {
        Ok(match self {
            Self::Echo => Some(message.into_value()),
            Self::Reply(value) => Some(value.clone()),
            Self::Silent => None,
        })
    }
}

/// Build the handler directory, keeping the configured order.
///
/// # Errors
///
/// Returns an error if a route is incomplete.
pub fn build_directory(routes: &[RouteConfig]) -> Result<HandlerDirectory> {
    let mut builder = HandlerDirectory::builder();

    for route in routes {
        let responder = Responder::from_config(route)?;
        info!(
            channel = %route.channel,
            message_type = %route.message_type,
            action = ?route.action,
            "Registered route"
        );
        builder = builder.route(route.channel.clone(), route.message_type.clone(), responder);
    }

    Ok(builder.build())
}
