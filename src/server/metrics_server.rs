// src/server/metrics_server.rs

use crate::core::metrics::gather_metrics;
use crate::core::state::AppState;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Handles HTTP requests to the /metrics endpoint.
///
/// Dynamic gauges are refreshed before gathering all registered metrics and
/// encoding them in the Prometheus text format.
async fn metrics_handler(state: Arc<AppState>) -> impl IntoResponse {
    let stats = state.cache.stats();
    crate::core::metrics::CACHE_KEYS.set(stats.entries as f64);

    let body = gather_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

/// Serves connection health reports as JSON for the operator dashboard.
async fn health_handler(state: Arc<AppState>) -> impl IntoResponse {
    let reports = state.monitor.reports();
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        serde_json::to_string(&reports).unwrap_or_else(|_| "[]".to_string()),
    )
}

/// Serves the current license state (cached; never triggers a validation).
async fn license_handler(state: Arc<AppState>) -> impl IntoResponse {
    let license = state.license.state().await;
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        serde_json::to_string(&license).unwrap_or_else(|_| "{}".to_string()),
    )
}

/// Runs a simple HTTP server exposing Prometheus metrics on /metrics and
/// connection health on /health/connections.
pub async fn run_metrics_server(state: Arc<AppState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let port = state.config.metrics.port;

    let metrics_state = state.clone();
    let health_state = state.clone();
    let app = Router::new()
        .route(
            "/metrics",
            get(move || metrics_handler(metrics_state.clone())),
        )
        .route(
            "/health/connections",
            get(move || health_handler(health_state.clone())),
        )
        .route(
            "/health/license",
            get(move || license_handler(state.clone())),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(
        "Prometheus metrics server listening on http://{}/metrics",
        addr
    );

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind metrics server on port {}: {}", port, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("Metrics server shutting down.");
        })
        .await
    {
        error!("Metrics server error: {}", e);
    }
}
