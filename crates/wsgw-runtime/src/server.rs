//! Router construction and gateway lifecycle.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use wsgw_cluster::ClusterRouter;
use wsgw_core::{ConnectionRegistry, IdMinter};
use wsgw_transport::BackendClient;

use crate::config::GatewayConfig;
use crate::handlers;

/// How long shutdown waits for live sessions to drain before giving up.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(20);

/// Errors that can occur while starting the gateway.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Shared state behind every request handler.
pub(crate) struct GatewayState {
    pub(crate) config: GatewayConfig,
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) backend: Arc<BackendClient>,
    pub(crate) cluster: Option<Arc<ClusterRouter>>,
    pub(crate) minter: IdMinter,
    /// Root of the per-session cancellation tokens.
    pub(crate) session_cancel: CancellationToken,
    /// Tracks session futures so shutdown can wait for them.
    pub(crate) sessions: TaskTracker,
}

/// The gateway's HTTP surface and lifecycle.
pub struct GatewayServer;

impl GatewayServer {
    /// Binds the listener and starts serving in a background task.
    ///
    /// The returned handle exposes the actual bound address (useful with
    /// port 0) and drives the graceful shutdown: stop accepting, cancel
    /// every session context, wait up to [`DRAIN_TIMEOUT`] for the session
    /// tasks to finish.
    pub async fn start(
        config: GatewayConfig,
        registry: Arc<ConnectionRegistry>,
        backend: Arc<BackendClient>,
        cluster: Option<Arc<ClusterRouter>>,
        minter: IdMinter,
    ) -> Result<RunningGateway, ServerError> {
        let listen_addr = config.listen_addr();
        let listener = TcpListener::bind(&listen_addr).await.map_err(|e| {
            ServerError::Bind {
                addr: listen_addr.clone(),
                source: e,
            }
        })?;
        let addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr: listen_addr,
            source: e,
        })?;

        let state = Arc::new(GatewayState {
            config,
            registry,
            backend,
            cluster,
            minter,
            session_cancel: CancellationToken::new(),
            sessions: TaskTracker::new(),
        });
        let router = build_router(Arc::clone(&state));

        info!(addr = %addr, "gateway instance is listening");

        let shutdown = CancellationToken::new();
        let serve_shutdown = shutdown.clone();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, router).into_future();
            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!(error = %e, "server error");
                    }
                }
                _ = serve_shutdown.cancelled() => {
                    info!("shutting down, draining sessions");
                    state.session_cancel.cancel();
                    state.sessions.close();
                    if timeout(DRAIN_TIMEOUT, state.sessions.wait()).await.is_err() {
                        warn!("sessions still active after the drain window, terminating");
                    } else {
                        info!("all sessions drained");
                    }
                }
            }
        });

        Ok(RunningGateway {
            addr,
            shutdown,
            task,
        })
    }
}

/// Handle to a started gateway.
pub struct RunningGateway {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RunningGateway {
    /// The address the listener is actually bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Token that triggers the graceful shutdown when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Triggers the graceful shutdown and waits for it to complete.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
    }
}

fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/connect", get(handlers::connect))
        .route("/app-info", get(handlers::app_info))
        .route("/message", post(handlers::push_missing_id))
        .route("/message/", post(handlers::push_missing_id))
        .route("/message/{connection_id}", post(handlers::push))
        .layer(middleware::from_fn(request_log))
        .with_state(state)
}

/// Logs one line per finished request.
async fn request_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        req_method = %method,
        req_url = %path,
        status_code = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "incoming request finished"
    );
    response
}
