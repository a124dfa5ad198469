//! # Switchboard Server
//!
//! Channel-multiplexed WebSocket message router.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! switchboard
//!
//! # Run with custom config
//! switchboard --config /path/to/switchboard.toml
//!
//! # Run with environment variables
//! SWITCHBOARD_PORT=8080 SWITCHBOARD_HOST=0.0.0.0 switchboard
//! SWITCHBOARD__TRANSPORT__MAX_MESSAGE_SIZE=1048576 switchboard
//! ```

mod config;
mod handlers;
mod metrics;
mod routes;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Channel-multiplexed WebSocket message router", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file. Defaults to the first of ./switchboard.toml,
    /// /etc/switchboard/switchboard.toml, ~/.config/switchboard/switchboard.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured host.
    #[arg(long)]
    host: Option<String>,

    /// Override the configured port.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!(
        routes = config.routes.len(),
        "Starting Switchboard on {}:{}", config.host, config.port
    );

    // Install the exporter before describing metrics
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::error!("Failed to start metrics server: {:#}", e);
        }
    }
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
