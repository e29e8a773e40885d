//! The service's status endpoint (spec.md §4.6): liveness plus a JSON
//! snapshot of the global metrics rollup. Grounded on the axum
//! `Router`/`axum::serve` pattern used for health checks in the pack's
//! other network-relay example.

use crate::metrics::MetricsStore;
use crate::port_pool::PortPool;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    metrics: Arc<MetricsStore>,
    port_pool: Arc<PortPool>,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct MetricsBody {
    total_channels: u64,
    active_channels: usize,
    total_latencies: u64,
    p50_latency: f64,
    p95_latency: f64,
    p99_latency: f64,
    max_latency: f64,
    avg_latency: f64,
    late_ratio: f64,
    packet_loss_ratio: f64,
    allocated_ports: usize,
    timestamp: String,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "healthy" })
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsBody> {
    let snap = state.metrics.snapshot();
    Json(MetricsBody {
        total_channels: snap.total_channels,
        active_channels: snap.active_channels,
        total_latencies: snap.total_latencies,
        p50_latency: snap.latency.p50_ms,
        p95_latency: snap.latency.p95_ms,
        p99_latency: snap.latency.p99_ms,
        max_latency: snap.latency.max_ms,
        avg_latency: snap.latency.avg_ms,
        late_ratio: snap.late_ratio,
        packet_loss_ratio: snap.loss_ratio,
        allocated_ports: state.port_pool.in_use_count(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Serves `/health` and `/metrics` on `addr` until the process exits.
pub async fn serve(
    addr: SocketAddr,
    metrics: Arc<MetricsStore>,
    port_pool: Arc<PortPool>,
) -> std::io::Result<()> {
    let state = AppState { metrics, port_pool };

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state);

    info!(%addr, "status endpoint listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
