//! Health, readiness and metrics endpoints.

use crate::error::ControllerError;
use crate::metrics::Metrics;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state of the probe server
#[derive(Clone)]
pub struct ProbeState {
    ready: Arc<AtomicBool>,
    metrics: Arc<Metrics>,
}

impl ProbeState {
    /// Not ready until [`ProbeState::set_ready`] is called
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            metrics,
        }
    }

    /// Flip readiness, e.g. once the watcher is running
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<ProbeState>) -> (StatusCode, &'static str) {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics(State(state): State<ProbeState>) -> (StatusCode, String) {
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            warn!("Failed to render metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Router serving `/healthz`, `/readyz` and `/metrics`
pub fn router(state: ProbeState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the probe endpoints until `shutdown` is cancelled
pub async fn serve(
    addr: SocketAddr,
    state: ProbeState,
    shutdown: CancellationToken,
) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Server(format!("failed to bind {}: {}", addr, e)))?;
    info!("Probe server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| ControllerError::Server(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ProbeState {
        ProbeState::new(Arc::new(Metrics::new().unwrap()))
    }

    #[tokio::test]
    async fn test_readiness_follows_flag() {
        let state = state();
        assert_eq!(readyz(State(state.clone())).await.0, StatusCode::SERVICE_UNAVAILABLE);

        state.set_ready(true);

        assert_eq!(readyz(State(state)).await, (StatusCode::OK, "ok"));
    }

    #[tokio::test]
    async fn test_metrics_are_rendered() {
        let state = state();
        state.metrics.record_reconcile("success", 0.5);

        let (status, body) = metrics(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("success"));
    }

    #[tokio::test]
    async fn test_healthz() {
        assert_eq!(healthz().await, "ok");
    }
}
