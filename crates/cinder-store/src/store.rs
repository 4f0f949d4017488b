//! BurnStore construction: SQLite pool, schema migration, shared validation.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use opendal::Operator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};

use cinder_core::config::{KdfConfig, LimitsConfig};
use cinder_core::types::PassphraseFields;
use cinder_core::{CinderError, CinderResult};
use cinder_crypto::{codec, IV_SIZE, KEY_SIZE, SALT_SIZE};

use crate::now_secs;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS notes (
    id               TEXT PRIMARY KEY,
    ciphertext       TEXT NOT NULL,
    iv               TEXT NOT NULL,
    created_at       INTEGER NOT NULL,
    expires_at       INTEGER NOT NULL,
    views_left       INTEGER NOT NULL,
    encryption_salt  TEXT,
    validation_salt  TEXT,
    kdf_iterations   INTEGER,
    passphrase_hash  TEXT
);
CREATE INDEX IF NOT EXISTS idx_notes_expires ON notes(expires_at);

CREATE TABLE IF NOT EXISTS files (
    id                 TEXT PRIMARY KEY,
    file_name          TEXT NOT NULL,
    size_bytes         INTEGER NOT NULL,
    chunk_bytes        INTEGER,
    total_chunks       INTEGER NOT NULL,
    iv_base            TEXT,
    storage_path       TEXT NOT NULL,
    created_at         INTEGER NOT NULL,
    expires_at         INTEGER NOT NULL,
    encryption_salt    TEXT,
    validation_salt    TEXT,
    kdf_iterations     INTEGER,
    passphrase_hash    TEXT,
    encrypted_filename TEXT,
    filename_iv        TEXT
);
CREATE INDEX IF NOT EXISTS idx_files_expires ON files(expires_at);

CREATE TABLE IF NOT EXISTS download_tokens (
    token        TEXT PRIMARY KEY,
    file_id      TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    created_at   INTEGER NOT NULL,
    expires_at   INTEGER NOT NULL,
    used         INTEGER NOT NULL DEFAULT 0,
    is_multi_use INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_download_tokens_file ON download_tokens(file_id);
CREATE INDEX IF NOT EXISTS idx_download_tokens_expires ON download_tokens(expires_at);

CREATE TABLE IF NOT EXISTS rate_limits (
    key   TEXT NOT NULL,
    scope TEXT NOT NULL,
    ts    INTEGER NOT NULL,
    ip    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rate_limits_key_ts ON rate_limits(key, scope, ts);
"#;

/// The server-side half of the burn protocol: metadata rows in SQLite,
/// ciphertext blobs behind an OpenDAL operator.
#[derive(Clone)]
pub struct BurnStore {
    pub(crate) db: Pool<Sqlite>,
    pub(crate) blobs: Operator,
    pub(crate) limits: LimitsConfig,
    pub(crate) kdf: KdfConfig,
}

impl BurnStore {
    /// Open (or create) the metadata database and run migrations.
    pub async fn open(
        db_path: impl AsRef<Path>,
        blobs: Operator,
        limits: LimitsConfig,
        kdf: KdfConfig,
    ) -> CinderResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path.display()))
                .map_err(sqlx::Error::from)?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .foreign_keys(true)
                .busy_timeout(Duration::from_secs(5));

        // SQLite permits limited write concurrency; a single connection avoids
        // "database is locked" failures and makes every statement serializable.
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            db,
            blobs,
            limits,
            kdf,
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> CinderResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.db).await?;
        Ok(())
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.db
    }

    pub fn blobs(&self) -> &Operator {
        &self.blobs
    }

    pub(crate) fn validate_expiry(&self, expires_at: i64) -> CinderResult<()> {
        let now = now_secs();
        if expires_at <= now {
            return Err(CinderError::Validation("expiry is in the past".into()));
        }
        if expires_at > now + self.limits.max_expiry_secs() {
            return Err(CinderError::Validation(format!(
                "expiry exceeds the {}-day horizon",
                self.limits.max_expiry_days
            )));
        }
        Ok(())
    }

    /// Enforce the all-or-nothing passphrase contract: salts decode to 16
    /// bytes each and differ from one another, the hash decodes to 32 bytes,
    /// and the iteration count meets the floor.
    pub(crate) fn validate_passphrase_fields(
        &self,
        fields: Option<&PassphraseFields>,
    ) -> CinderResult<()> {
        let Some(fields) = fields else {
            return Ok(());
        };

        let enc: [u8; SALT_SIZE] = codec::decode_array(&fields.encryption_salt, "encryption_salt")
            .map_err(|e| CinderError::Validation(e.to_string()))?;
        let val: [u8; SALT_SIZE] = codec::decode_array(&fields.validation_salt, "validation_salt")
            .map_err(|e| CinderError::Validation(e.to_string()))?;
        if enc == val {
            return Err(CinderError::Validation(
                "encryption_salt and validation_salt must be independent".into(),
            ));
        }

        codec::decode_array::<KEY_SIZE>(&fields.passphrase_hash, "passphrase_hash")
            .map_err(|e| CinderError::Validation(e.to_string()))?;

        if fields.kdf_iterations < self.kdf.min_iterations {
            return Err(CinderError::Validation(format!(
                "kdf_iterations below the {} floor",
                self.kdf.min_iterations
            )));
        }
        Ok(())
    }

    pub(crate) fn validate_iv(&self, iv: &str) -> CinderResult<()> {
        codec::decode_array::<IV_SIZE>(iv, "iv")
            .map(|_| ())
            .map_err(|e| CinderError::Validation(e.to_string()))
    }

    /// 256-bit random download token, base64url.
    pub(crate) fn mint_token() -> String {
        codec::encode(&codec::random_bytes(32))
    }
}
