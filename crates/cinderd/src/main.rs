//! cinderd: burn-after-read secret sharing daemon
//!
//! Usage:
//!   cinderd [--config /etc/cinder/config.toml]
//!
//! Serves the JSON API on `daemon.listen` and Prometheus metrics + health
//! probes on `daemon.metrics_addr`. Ciphertext blobs go to the configured
//! object store; metadata lives in SQLite.

mod api;
mod daemon;
mod guard;
mod metrics;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use cinder_core::config::CinderConfig;

#[derive(Parser, Debug)]
#[command(name = "cinderd", version, about = "Cinder secret-sharing daemon")]
struct Cli {
    /// Path to cinder.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "CINDER_CONFIG",
        default_value = "/etc/cinder/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CINDER_LOG", default_value = "info")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "CINDER_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log, &cli.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "cinderd starting"
    );

    let config = load_config(&cli.config).await?;
    daemon::run(config).await
}

async fn load_config(path: &PathBuf) -> Result<CinderConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
    } else {
        tracing::warn!("config file not found: {}  (using defaults)", path.display());
        Ok(CinderConfig::default())
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
