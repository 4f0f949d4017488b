//! OpenDAL Operator factory for the blob store.
//!
//! The burn protocol is agnostic to the byte container: an S3-compatible
//! service in production, a local directory or the in-memory service in
//! tests. Everything addresses blobs by the opaque `storage_path` recorded
//! in the metadata row.

use anyhow::{Context, Result};
use opendal::Operator;

use cinder_core::config::{BlobBackend, StorageConfig};

/// S3 credentials, resolved by the caller (env vars in the daemon).
#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Build an operator for the configured backend.
///
/// If `enforce_tls` is set and the S3 endpoint uses plaintext HTTP, this
/// returns an error instead of transmitting credentials unencrypted.
pub fn build_operator(cfg: &StorageConfig, creds: Option<&S3Credentials>) -> Result<Operator> {
    let op = match cfg.backend {
        BlobBackend::S3 => {
            if cfg.endpoint.starts_with("http://") {
                if cfg.enforce_tls {
                    anyhow::bail!(
                        "S3 endpoint uses plaintext HTTP ({}), but storage.enforce_tls is enabled. \
                         Use an HTTPS endpoint or disable enforce_tls for local development.",
                        cfg.endpoint
                    );
                }
                tracing::warn!(
                    endpoint = %cfg.endpoint,
                    "S3 endpoint uses plaintext HTTP — credentials are transmitted unencrypted"
                );
            }
            let creds = creds.context("S3 backend requires credentials")?;
            let builder = opendal::services::S3::default()
                .endpoint(&cfg.endpoint)
                .region(&cfg.region)
                .bucket(&cfg.bucket)
                .access_key_id(&creds.access_key_id)
                .secret_access_key(&creds.secret_access_key);
            Operator::new(builder)
                .context("creating OpenDAL S3 operator")?
                .finish()
        }
        BlobBackend::Fs => {
            let builder =
                opendal::services::Fs::default().root(&cfg.fs_root.to_string_lossy());
            Operator::new(builder)
                .context("creating OpenDAL fs operator")?
                .finish()
        }
        BlobBackend::Memory => Operator::new(opendal::services::Memory::default())
            .context("creating OpenDAL memory operator")?
            .finish(),
    };

    Ok(op
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(3)
                .with_jitter(),
        ))
}

/// Verify the blob store is reachable by listing the root.
pub async fn check_health(op: &Operator) -> Result<()> {
    op.list("/")
        .await
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("blob store health check failed: {e}"))
}
