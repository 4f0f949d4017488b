//! Prometheus /metrics + health check HTTP endpoints
//!
//! Endpoints:
//!   GET /metrics  — Prometheus text format
//!   GET /healthz  — Liveness probe (always 200 if the process is running)
//!   GET /readyz   — Readiness probe (200 if the blob store is reachable)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus_client::{
    encoding::text::encode, metrics::counter::Counter, registry::Registry,
};
use std::sync::Arc;

/// API and sweeper counters, registered once at startup.
pub struct ApiMetrics {
    pub notes_created: Counter,
    pub notes_burned: Counter,
    pub files_created: Counter,
    pub files_downloaded: Counter,
    pub rate_limited: Counter,
    pub sweep_reclaimed: Counter,
}

impl ApiMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let notes_created = Counter::default();
        let notes_burned = Counter::default();
        let files_created = Counter::default();
        let files_downloaded = Counter::default();
        let rate_limited = Counter::default();
        let sweep_reclaimed = Counter::default();

        registry.register(
            "cinder_notes_created",
            "Notes created",
            notes_created.clone(),
        );
        registry.register(
            "cinder_notes_burned",
            "Notes revealed and burned",
            notes_burned.clone(),
        );
        registry.register(
            "cinder_files_created",
            "Files created (whole or chunked)",
            files_created.clone(),
        );
        registry.register(
            "cinder_files_downloaded",
            "Completed file downloads",
            files_downloaded.clone(),
        );
        registry.register(
            "cinder_rate_limited",
            "Requests rejected by the rate limiter",
            rate_limited.clone(),
        );
        registry.register(
            "cinder_sweep_reclaimed",
            "Expired records reclaimed by the sweeper",
            sweep_reclaimed.clone(),
        );

        ApiMetrics {
            notes_created,
            notes_burned,
            files_created,
            files_downloaded,
            rate_limited,
            sweep_reclaimed,
        }
    }
}

/// Shared state for the metrics listener.
#[derive(Clone)]
pub struct HealthState {
    pub registry: Arc<Registry>,
    pub operator: opendal::Operator,
}

/// Serve Prometheus metrics and health endpoints on `addr`.
pub async fn serve(addr: String, state: HealthState) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz, /readyz");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &state.registry) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match cinder_store::check_health(&state.operator).await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "blob store unreachable"),
    }
}
