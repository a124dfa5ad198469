//! HTTP entry point for the Switchboard server.
//!
//! Every WebSocket upgrade, on any path, becomes a channel connection named
//! by that path. Plain requests only get the health check.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::routes;
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocket, ConnectInfo, State, WebSocketUpgrade},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use switchboard_core::{
    Acceptor, ConnectionInfo, RegistryConfig, Router as SwitchboardRouter, RouterConfig,
};
use switchboard_transport::UpgradedConnection;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Shared server state.
pub struct AppState {
    /// The message router.
    pub router: Arc<SwitchboardRouter>,
    /// Registers and serves upgraded connections.
    pub acceptor: Acceptor,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured routes are invalid.
    pub fn new(config: Config) -> Result<Self> {
        let directory = routes::build_directory(&config.routes)?;
        let router_config = RouterConfig {
            registry: RegistryConfig {
                prune_empty_channels: config.registry.prune_empty_channels,
            },
        };

        let router = Arc::new(SwitchboardRouter::with_config(directory, router_config));
        let acceptor = Acceptor::new(Arc::clone(&router)).on_connect({
            let router = Arc::clone(&router);
            move |_: &ConnectionInfo| {
                metrics::set_active_channels(router.registry().stats().channel_count);
            }
        });

        Ok(Self {
            router,
            acceptor,
            config,
        })
    }
}

/// Build the HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new().fallback(entry_handler).with_state(state)
}

/// Serve the application on an already-bound listener.
///
/// # Errors
///
/// Returns an error if the server stops unexpectedly.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config)?);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Switchboard listening on {}", addr);
    info!(
        handlers = state.router.directory().len(),
        "Channel endpoint: ws://{}/<channel>", addr
    );

    serve(listener, state).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Single entry point for every path.
async fn entry_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(ws) => {
            let target = uri.to_string();
            ws.on_upgrade(move |socket| handle_websocket(socket, target, remote, state))
        }
        None if method == Method::GET && uri.path() == state.config.transport.health_path => {
            health_handler().await.into_response()
        }
        None => (StatusCode::UPGRADE_REQUIRED, "WebSocket upgrade required").into_response(),
    }
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Handle a WebSocket connection.
async fn handle_websocket(
    socket: WebSocket,
    target: String,
    remote: SocketAddr,
    state: Arc<AppState>,
) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection = UpgradedConnection::new(socket, target)
        .with_remote_addr(remote)
        .with_max_message_size(state.config.transport.max_message_size);

    let Some(task) = state.acceptor.bind(Box::new(connection)) else {
        return;
    };
    if let Err(e) = task.await {
        error!(remote = %remote, error = %e, "Connection task failed");
    }

    metrics::set_active_channels(state.router.registry().stats().channel_count);
    debug!(remote = %remote, "WebSocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteAction, RouteConfig};
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    async fn start(routes: Vec<RouteConfig>) -> SocketAddr {
        start_with_state(routes).await.0
    }

    async fn start_with_state(routes: Vec<RouteConfig>) -> (SocketAddr, Arc<AppState>) {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            routes,
            ..Config::default()
        };
        let state = Arc::new(AppState::new(config).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let served = Arc::clone(&state);
        tokio::spawn(async move {
            axum::serve(
                listener,
                app(served).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        (addr, state)
    }

    async fn wait_for_connections(state: &AppState, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while state.router.registry().stats().connection_count != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_health_and_upgrade_required() {
        let addr = start(Vec::new()).await;

        let health = http_get(addr, "/health").await;
        assert!(health.starts_with("HTTP/1.1 200"));
        assert!(health.contains(r#""status":"ok""#));

        let other = http_get(addr, "/game42").await;
        assert!(other.starts_with("HTTP/1.1 426"));
    }

    #[tokio::test]
    async fn test_channel_connection_echo() {
        let addr = start(vec![RouteConfig {
            channel: "game42".to_string(),
            message_type: "move".to_string(),
            action: RouteAction::Echo,
            value: None,
        }])
        .await;

        let (mut player, _) = connect_async(format!("ws://{}/game42", addr)).await.unwrap();
        let (mut elsewhere, _) = connect_async(format!("ws://{}/game7", addr)).await.unwrap();

        player
            .send(Message::Text(r#"{"type":"move","dx":1}"#.into()))
            .await
            .unwrap();
        elsewhere
            .send(Message::Text(r#"{"type":"move","dx":1}"#.into()))
            .await
            .unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(5), player.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let reply: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
        assert_eq!(reply, json!({"type": "move", "dx": 1}));

        let nothing = tokio::time::timeout(Duration::from_millis(200), elsewhere.next()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_upgraded_connection_goes_through_acceptor() {
        let (addr, state) = start_with_state(Vec::new()).await;

        let (mut client, _) = connect_async(format!("ws://{}/lobby", addr)).await.unwrap();
        wait_for_connections(&state, 1).await;
        assert_eq!(state.router.registry().stats().channel_count, 1);

        client.close(None).await.unwrap();
        wait_for_connections(&state, 0).await;
    }
}
