//! Health and metrics server.
//!
//! A minimal read-only surface: how many jobs are in flight, and the
//! Prometheus metrics text.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tracing::info;

use crate::error::WorkerResult;

#[derive(Clone)]
struct HealthState {
    in_flight: Arc<AtomicUsize>,
    prometheus: PrometheusHandle,
}

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub in_flight: usize,
    pub version: String,
}

async fn healthz(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        in_flight: state.in_flight.load(Ordering::SeqCst),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn metrics_text(State(state): State<HealthState>) -> String {
    state.prometheus.render()
}

/// Serve the health endpoint until the process exits.
pub async fn serve(
    port: u16,
    in_flight: Arc<AtomicUsize>,
    prometheus: PrometheusHandle,
) -> WorkerResult<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_text))
        .with_state(HealthState {
            in_flight,
            prometheus,
        });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Health server listening on port {}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
