//! Connection acceptor.
//!
//! Pulls connections off a [`Transport`], pins each one to its channel and
//! serves it on its own task.

use crate::channel::ChannelId;
use crate::metrics;
use crate::router::Router;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use switchboard_transport::{Connection, ConnectionId, Transport, TransportError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pause after an I/O error from the listener before accepting again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// What the acceptor knows about a freshly accepted connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Channel the connection was pinned to.
    pub channel: ChannelId,
    /// Request target the client connected with.
    pub request_target: String,
    /// Peer address, when the transport knows it.
    pub remote_addr: Option<String>,
}

type ConnectHook = Arc<dyn Fn(&ConnectionInfo) + Send + Sync>;

/// Accepts connections and hands them to a [`Router`].
pub struct Acceptor {
    router: Arc<Router>,
    on_connect: Option<ConnectHook>,
}

impl Acceptor {
    /// Create an acceptor for a router.
    #[must_use]
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            on_connect: None,
        }
    }

    /// Run `hook` for every connection once it is registered, before its
    /// first message is read. A connection whose hook panics is dropped.
    #[must_use]
    pub fn on_connect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ConnectionInfo) + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(hook));
        self
    }

    /// The router connections are handed to.
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Accept connections until the transport closes.
    pub async fn run<T: Transport + ?Sized>(&self, transport: &T) {
        self.run_until(transport, std::future::pending()).await;
    }

    /// Accept connections until the transport closes or `shutdown` resolves.
    ///
    /// Connections already being served keep running.
    pub async fn run_until<T, S>(&self, transport: &T, shutdown: S)
    where
        T: Transport + ?Sized,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(transport = transport.name(), "Accepting connections");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting");
                    break;
                }
                accepted = transport.accept() => match accepted {
                    Ok(connection) => {
                        self.bind(connection);
                    }
                    Err(TransportError::ListenerClosed) => {
                        info!(transport = transport.name(), "Listener closed");
                        break;
                    }
                    Err(TransportError::Io(e)) => {
                        warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    Err(e) => {
                        debug!(error = %e, "Dropped incoming connection");
                    }
                },
            }
        }
    }

    /// Register a connection and serve it on a new task.
    ///
    /// Returns `None` if the connection could not be registered or the
    /// connect hook panicked.
    pub fn bind(&self, mut connection: Box<dyn Connection>) -> Option<JoinHandle<()>> {
        let channel = match self.router.accept(connection.as_ref()) {
            Ok(channel) => channel,
            Err(e) => {
                error!(
                    connection = %connection.id(),
                    error = %e,
                    "Failed to register connection"
                );
                return None;
            }
        };

        let info = ConnectionInfo {
            id: connection.id(),
            channel,
            request_target: connection.request_target().to_string(),
            remote_addr: connection.remote_addr(),
        };

        info!(
            connection = %info.id,
            channel = %info.channel,
            remote = ?info.remote_addr,
            "New connection"
        );
        metrics::record_connection();

        if let Some(hook) = &self.on_connect {
            if catch_unwind(AssertUnwindSafe(|| hook(&info))).is_err() {
                error!(connection = %info.id, channel = %info.channel, "Connect hook panicked");
                self.router.registry().unregister(info.id);
                return None;
            }
        }

        let router = Arc::clone(&self.router);
        let connection_id = info.id;

        Some(tokio::spawn(async move {
            if let Err(e) = router.serve(connection.as_mut()).await {
                debug!(connection = %connection_id, error = %e, "Connection ended with error");
            }
            if let Err(e) = connection.close().await {
                debug!(connection = %connection_id, error = %e, "Close failed");
            }
            info!(connection = %connection_id, "Connection closed");
        }))
    }
}
