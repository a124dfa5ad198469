//! Metrics export for the Switchboard server.
//!
//! The router records through the `metrics` facade; this module describes
//! those metrics, adds connection and channel gauges, and exports
//! everything in Prometheus format.

use anyhow::{Context, Result};
use metrics::gauge;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use switchboard_core::metrics::names as router;
use tracing::info;

/// Metric names owned by the server.
pub mod names {
    pub const CONNECTIONS_ACTIVE: &str = "switchboard_connections_active";
    pub const CHANNELS_ACTIVE: &str = "switchboard_channels_active";
}

/// Describe every exported metric.
///
/// Call after the recorder is installed. Descriptions sent before that are
/// lost.
pub fn init_metrics() {
    metrics::describe_counter!(
        router::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_gauge!(names::CHANNELS_ACTIVE, "Current number of channels");
    metrics::describe_counter!(
        router::MESSAGES_TOTAL,
        "Inbound messages processed, by outcome"
    );
    metrics::describe_counter!(router::REPLIES_TOTAL, "Replies written");
    metrics::describe_counter!(router::REPLY_BYTES_TOTAL, "Bytes written as replies");
    metrics::describe_counter!(
        router::HANDLER_ERRORS_TOTAL,
        "Handlers that failed or panicked"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Update the channel gauge.
pub fn set_active_channels(count: usize) {
    gauge!(names::CHANNELS_ACTIVE).set(count as f64);
}

/// Holds the active connection gauge up while alive. The total is counted
/// by the acceptor.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}
