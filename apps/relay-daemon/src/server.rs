//! Health, metrics and status endpoints.
//!
//! ```text
//! GET /health   {"status":"ok"}
//! GET /metrics  Prometheus text exposition
//! GET /status   PollStatus snapshot as JSON
//! ```

use std::future::Future;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use relay_engine::{PollLoopHandle, PollStatus};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::info;

/// Shared state for the handlers.
#[derive(Clone)]
pub struct AppState {
    pub poll: PollLoopHandle,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

/// Binds `bind_addr` and serves until `shutdown` resolves.
pub async fn serve<F>(bind_addr: &str, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!(addr = %bind_addr, "HTTP server started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// Liveness only; never inspects the loop.
async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        ),
    }
}

async fn status_handler(State(state): State<AppState>) -> Json<PollStatus> {
    Json(state.poll.status().await)
}
