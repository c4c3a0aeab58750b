//! HTTP surface for the aggregation worker.
//!
//! # Endpoints
//!
//! - `GET /api/pull-requests` - current records and status as JSON
//! - `GET /api/pull-requests/stream` - worker events as server-sent events
//! - `GET /health` - returns 200 while the server is up
//!
//! Both pull request endpoints start the worker on first use.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::worker::PullRequestWorker;

pub mod health;
pub mod snapshot;
pub mod stream;

pub use health::health_handler;
pub use snapshot::{PullRequestsResponse, snapshot_handler};
pub use stream::{stream_handler, to_sse_event};

/// Shared application state passed to handlers through axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    worker: PullRequestWorker,
}

impl AppState {
    /// Wraps `worker` for the router.
    #[must_use]
    pub const fn new(worker: PullRequestWorker) -> Self {
        Self { worker }
    }

    /// The worker behind every endpoint.
    #[must_use]
    pub const fn worker(&self) -> &PullRequestWorker {
        &self.worker
    }
}

/// Builds the router with every endpoint.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/api/pull-requests", get(snapshot_handler))
        .route("/api/pull-requests/stream", get(stream_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}

/// Binds `addr` and serves the router until `shutdown` fires.
///
/// # Errors
///
/// Returns an I/O error when the address cannot be bound or the server
/// fails.
pub async fn serve(
    addr: SocketAddr,
    app_state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

#[cfg(test)]
mod tests;
