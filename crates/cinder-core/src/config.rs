use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level daemon configuration (loaded from cinder.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CinderConfig {
    pub daemon: DaemonConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
    pub kdf: KdfConfig,
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// API listen address (default: 127.0.0.1:8880)
    pub listen: String,
    /// Prometheus metrics endpoint (default: 127.0.0.1:9100)
    pub metrics_addr: Option<String>,
    /// Public origin used for same-origin checks and share URLs,
    /// e.g. "https://cinder.example.com". None disables the origin check.
    pub public_origin: Option<String>,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

/// Blob store backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    /// S3-compatible endpoint (production)
    S3,
    /// Local filesystem directory
    Fs,
    /// In-process memory (tests only)
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BlobBackend,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Root directory for the fs backend
    pub fs_root: PathBuf,
    /// SQLite metadata database path
    pub metadata_db: PathBuf,
    /// Enforce HTTPS for S3 connections (error on HTTP endpoints)
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longest allowed lifetime of a secret, in days (default: 60)
    pub max_expiry_days: i64,
    /// Maximum view count for a note (default: 100)
    pub max_views: u32,
    /// Whole-file upload ceiling in MiB; larger files must be chunked
    pub whole_file_max_mib: u64,
    /// Absolute plaintext size ceiling in MiB
    pub file_max_mib: u64,
    /// Smallest allowed chunk size in bytes (default: 1 MiB)
    pub chunk_min_bytes: u64,
    /// Largest allowed chunk size in bytes (default: 4 MiB)
    pub chunk_max_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// Minimum accepted PBKDF2 iteration count
    pub min_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Seconds between expiry sweeps (default: 300)
    pub interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8880".into(),
            metrics_addr: Some("127.0.0.1:9100".into()),
            public_origin: None,
            log_level: "info".into(),
            log_format: "json".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BlobBackend::S3,
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "cinder".into(),
            fs_root: PathBuf::from("/var/lib/cinder/blobs"),
            metadata_db: PathBuf::from("/var/lib/cinder/meta.db"),
            enforce_tls: false,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_expiry_days: 60,
            max_views: 100,
            whole_file_max_mib: 100,
            file_max_mib: 500,
            chunk_min_bytes: 1024 * 1024,
            chunk_max_bytes: 4 * 1024 * 1024,
        }
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            min_iterations: 210_000,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

impl LimitsConfig {
    pub fn max_expiry_secs(&self) -> i64 {
        self.max_expiry_days * 24 * 60 * 60
    }

    pub fn whole_file_max_bytes(&self) -> u64 {
        self.whole_file_max_mib * 1024 * 1024
    }

    pub fn file_max_bytes(&self) -> u64 {
        self.file_max_mib * 1024 * 1024
    }
}
