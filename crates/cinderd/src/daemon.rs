//! Daemon lifecycle: storage bring-up, background sweeper, metrics listener,
//! API server with graceful shutdown.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use cinder_core::config::{BlobBackend, CinderConfig};
use cinder_store::blob::S3Credentials;
use cinder_store::{build_operator, check_health, BurnStore, RateLimiter};

use crate::api::{self, AppState};
use crate::metrics::{ApiMetrics, HealthState};

pub async fn run(config: CinderConfig) -> Result<()> {
    info!("daemon starting");

    let creds = match config.storage.backend {
        BlobBackend::S3 => Some(load_s3_credentials()?),
        _ => None,
    };
    let operator = build_operator(&config.storage, creds.as_ref())
        .context("building blob store operator")?;

    match check_health(&operator).await {
        Ok(()) => info!(backend = ?config.storage.backend, "blob store: connected"),
        // Keep the operator; readiness stays red until the store comes up
        Err(e) => warn!(backend = ?config.storage.backend, "blob store: {e}"),
    }

    let store = BurnStore::open(
        &config.storage.metadata_db,
        operator.clone(),
        config.limits.clone(),
        config.kdf.clone(),
    )
    .await
    .with_context(|| format!("opening metadata db {}", config.storage.metadata_db.display()))?;

    let limiter = RateLimiter::new(store.pool().clone());

    let mut registry = prometheus_client::registry::Registry::default();
    let metrics = Arc::new(ApiMetrics::new(&mut registry));

    if let Some(addr) = config.daemon.metrics_addr.clone() {
        let health = HealthState {
            registry: Arc::new(registry),
            operator: operator.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = crate::metrics::serve(addr, health).await {
                error!("metrics server failed: {e}");
            }
        });
    }

    spawn_sweeper(store.clone(), metrics.clone(), config.sweep.interval_secs);

    let listen = config.daemon.listen.clone();
    let state = AppState {
        store,
        limiter,
        config: Arc::new(config),
        metrics,
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding API listener on {listen}"))?;
    info!(addr = %listen, "api: listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("api server")?;

    info!("daemon exiting cleanly");
    Ok(())
}

/// Periodic expiry sweep. Failures are logged and retried next tick; the
/// interval also bounds how long orphaned blobs from partial failures live.
fn spawn_sweeper(store: BurnStore, metrics: Arc<ApiMetrics>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            match store.sweep_expired().await {
                Ok(report) => {
                    let reclaimed = report.notes + report.files + report.tokens;
                    if reclaimed > 0 {
                        metrics.sweep_reclaimed.inc_by(reclaimed);
                    }
                }
                Err(e) => warn!("sweep failed: {e}"),
            }
        }
    });
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("registering SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("registering SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}

fn load_s3_credentials() -> Result<S3Credentials> {
    let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
        .or_else(|_| std::env::var("CINDER_ACCESS_KEY_ID"))
        .context("S3 credentials not set: export AWS_ACCESS_KEY_ID")?;
    let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .or_else(|_| std::env::var("CINDER_SECRET_ACCESS_KEY"))
        .context("AWS_SECRET_ACCESS_KEY not set")?;
    Ok(S3Credentials {
        access_key_id,
        secret_access_key,
    })
}
