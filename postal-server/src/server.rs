//! Listener ownership, accept loop and graceful shutdown.
//!
//! # Shutdown sequence
//!
//! 1. The shutdown token is cancelled (signal handler or test).
//! 2. The accept loop exits and the listener is dropped; later connection
//!    attempts are refused.
//! 3. Every open connection is told to shut down gracefully: in-flight
//!    requests finish, idle keep-alive connections close.
//! 4. `LifecycleManager::drain_requests` waits up to the drain timeout.
//! 5. Connections still open after that are aborted.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use postal_core::AddressParser;
use postal_core::config::ServerConfig;
use postal_core::lifecycle::{DrainResult, LifecycleManager};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ServerError;
use crate::router::{AppState, router};

/// A bound, not yet running, postal HTTP server.
pub struct PostalServer {
    listener: TcpListener,
    app: Router,
    lifecycle: Arc<LifecycleManager>,
}

impl PostalServer {
    /// Bind the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] when the address cannot be bound.
    pub async fn bind(
        config: &ServerConfig,
        parser: Arc<dyn AddressParser>,
        lifecycle: Arc<LifecycleManager>,
    ) -> Result<Self, ServerError> {
        let addr = config.bind_string();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let state = AppState::new(parser).with_max_body_bytes(config.max_body_bytes);

        Ok(Self {
            listener,
            app: router(state),
            lifecycle,
        })
    }

    /// Address the listener is bound to (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the lifecycle's shutdown token is cancelled, then drain.
    ///
    /// Returns how the drain ended. The lifecycle is `Stopped` on return.
    pub async fn run(self) -> DrainResult {
        let Self {
            listener,
            app,
            lifecycle,
        } = self;
        let shutdown = lifecycle.shutdown_token();
        let mut connections = JoinSet::new();

        if let Ok(addr) = listener.local_addr() {
            info!(
                addr = %addr,
                drain_timeout_secs = lifecycle.config().drain_timeout.as_secs(),
                "Postal server listening"
            );
        }
        lifecycle.mark_ready();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping new connections");
                    break;
                }

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined
                        && e.is_panic()
                    {
                        error!(error = %e, "Connection task panicked");
                    }
                }

                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let Some(guard) = lifecycle.track_request() else {
                                warn!(peer = %peer, "Rejected connection: shutting down");
                                continue;
                            };
                            let app = app.clone();
                            let conn_shutdown = shutdown.clone();
                            connections.spawn(async move {
                                let _guard = guard;
                                serve_connection(stream, peer, app, conn_shutdown).await;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        drop(listener);
        lifecycle.begin_shutdown();

        info!(
            active_connections = lifecycle.active_request_count(),
            drain_timeout_secs = lifecycle.config().drain_timeout.as_secs(),
            "Waiting for active connections to drain"
        );
        let result = lifecycle.drain_requests().await;

        if let DrainResult::Timeout { remaining } = result {
            warn!(remaining, "Aborting connections still open after drain timeout");
            connections.abort_all();
        }
        while connections.join_next().await.is_some() {}

        lifecycle.mark_stopped();
        info!(
            result = ?result,
            version = lifecycle.version(),
            uptime_secs = lifecycle.uptime_seconds(),
            "Postal server stopped"
        );
        result
    }
}

/// Serve one connection until it closes, or until shutdown lets its
/// in-flight request finish.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    shutdown: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
    }

    let io = TokioIo::new(stream);
    let service = TowerToHyperService::new(app);
    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(io, service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                debug!(peer = %peer, error = %e, "Connection closed with error");
            }
        }
        _ = shutdown.cancelled() => {
            debug!(peer = %peer, "Gracefully closing connection");
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.await {
                debug!(peer = %peer, error = %e, "Connection closed with error during shutdown");
            }
        }
    }
}
