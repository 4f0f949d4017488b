//! File operations: whole-file and chunked uploads, token-gated downloads,
//! transactional deletion after a successful retrieval.

use sqlx::Row;
use uuid::Uuid;

use cinder_core::types::{
    CreateFileResponse, FileMetaResponse, FinalizeResponse, InitChunkedRequest, WholeFileParams,
};
use cinder_core::{CinderError, CinderResult};
use cinder_crypto::kdf::hashes_match;
use cinder_crypto::TAG_SIZE;

use crate::now_secs;
use crate::store::BurnStore;

/// Single-use tokens live 5 minutes, multi-use tokens 10.
pub const SINGLE_USE_TOKEN_TTL_SECS: i64 = 300;
pub const MULTI_USE_TOKEN_TTL_SECS: i64 = 600;

/// Blob object name for one chunk: `part-NNNNN` under the file's prefix.
pub fn chunk_object_path(storage_path: &str, index: u32) -> String {
    format!("{storage_path}/part-{index:05}")
}

impl BurnStore {
    /// Store a whole-file secret: blob first, metadata second. If the
    /// metadata insert fails the blob is removed again (compensating action).
    pub async fn create_file_whole(
        &self,
        params: &WholeFileParams,
        ciphertext: Vec<u8>,
    ) -> CinderResult<CreateFileResponse> {
        self.validate_expiry(params.expires_at)?;
        self.validate_iv(&params.iv)?;
        self.validate_passphrase_fields(whole_file_passphrase(params)?.as_ref())?;

        if params.size_bytes == 0 || params.size_bytes > self.limits.whole_file_max_bytes() {
            return Err(CinderError::Validation(format!(
                "whole-file size must be between 1 byte and {} MiB",
                self.limits.whole_file_max_mib
            )));
        }
        if ciphertext.len() as u64 != params.size_bytes + TAG_SIZE as u64 {
            return Err(CinderError::Validation(
                "ciphertext length does not match declared size".into(),
            ));
        }
        if params.file_name.is_empty() {
            return Err(CinderError::Validation("missing file_name".into()));
        }

        let id = Uuid::new_v4().to_string();
        let storage_path = format!("{}.bin", Uuid::new_v4());

        self.blobs.write(&storage_path, ciphertext).await?;

        let insert = sqlx::query(
            "INSERT INTO files (id, file_name, size_bytes, chunk_bytes, total_chunks, iv_base,
                                storage_path, created_at, expires_at,
                                encryption_salt, validation_salt, kdf_iterations, passphrase_hash,
                                encrypted_filename, filename_iv)
             VALUES (?, ?, ?, NULL, 1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&params.file_name)
        .bind(params.size_bytes as i64)
        .bind(&params.iv)
        .bind(&storage_path)
        .bind(now_secs())
        .bind(params.expires_at)
        .bind(params.encryption_salt.as_deref())
        .bind(params.validation_salt.as_deref())
        .bind(params.kdf_iterations.map(|i| i as i64))
        .bind(params.passphrase_hash.as_deref())
        .bind(params.encrypted_filename.as_deref())
        .bind(params.filename_iv.as_deref())
        .execute(&self.db)
        .await;

        if let Err(e) = insert {
            if let Err(del) = self.blobs.delete(&storage_path).await {
                tracing::warn!(storage_path, error = %del, "orphan blob left for sweeper");
            }
            return Err(e.into());
        }

        Ok(CreateFileResponse { id, storage_path })
    }

    /// Begin a chunked upload. The metadata row is inserted without an
    /// `iv_base`; it lands with the first chunk. `storage_path` is the file
    /// id, used as a directory prefix for the `part-NNNNN` objects.
    pub async fn init_chunked_upload(&self, req: &InitChunkedRequest) -> CinderResult<String> {
        self.validate_expiry(req.expires_at)?;
        self.validate_passphrase_fields(req.passphrase.as_ref())?;

        if req.chunk_bytes < self.limits.chunk_min_bytes
            || req.chunk_bytes > self.limits.chunk_max_bytes
        {
            return Err(CinderError::Validation(format!(
                "chunk_bytes must be between {} and {}",
                self.limits.chunk_min_bytes, self.limits.chunk_max_bytes
            )));
        }
        if req.size_bytes == 0 || req.size_bytes > self.limits.file_max_bytes() {
            return Err(CinderError::Validation(format!(
                "file size must be between 1 byte and {} MiB",
                self.limits.file_max_mib
            )));
        }
        let expected = req.size_bytes.div_ceil(req.chunk_bytes).max(1) as u32;
        if req.total_chunks != expected {
            return Err(CinderError::Validation(format!(
                "total_chunks must equal ceil(size_bytes / chunk_bytes) = {expected}"
            )));
        }
        if req.file_name.is_empty() {
            return Err(CinderError::Validation("missing file_name".into()));
        }

        let id = Uuid::new_v4().to_string();
        let p = req.passphrase.as_ref();

        sqlx::query(
            "INSERT INTO files (id, file_name, size_bytes, chunk_bytes, total_chunks, iv_base,
                                storage_path, created_at, expires_at,
                                encryption_salt, validation_salt, kdf_iterations, passphrase_hash,
                                encrypted_filename, filename_iv)
             VALUES (?, ?, ?, ?, ?, NULL, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&req.file_name)
        .bind(req.size_bytes as i64)
        .bind(req.chunk_bytes as i64)
        .bind(req.total_chunks as i64)
        .bind(&id)
        .bind(now_secs())
        .bind(req.expires_at)
        .bind(p.map(|p| p.encryption_salt.as_str()))
        .bind(p.map(|p| p.validation_salt.as_str()))
        .bind(p.map(|p| p.kdf_iterations as i64))
        .bind(p.map(|p| p.passphrase_hash.as_str()))
        .bind(req.encrypted_filename.as_deref())
        .bind(req.filename_iv.as_deref())
        .execute(&self.db)
        .await?;

        Ok(id)
    }

    /// Store one encrypted chunk. Idempotent: an already-present part object
    /// is success, never an overwrite. `iv_base` accompanies chunk 0 and is
    /// written at most once.
    pub async fn upload_chunk(
        &self,
        file_id: &str,
        index: u32,
        total: u32,
        iv_base: Option<&str>,
        bytes: Vec<u8>,
    ) -> CinderResult<()> {
        let row = sqlx::query(
            "SELECT total_chunks, chunk_bytes, storage_path, expires_at FROM files WHERE id = ?",
        )
        .bind(file_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(CinderError::Gone)?;

        if row.get::<i64, _>("expires_at") < now_secs() {
            return Err(CinderError::Gone);
        }

        let total_chunks = row.get::<i64, _>("total_chunks") as u32;
        let chunk_bytes = row.get::<Option<i64>, _>("chunk_bytes").ok_or_else(|| {
            CinderError::Validation("file was not created for chunked upload".into())
        })? as u64;

        if total != total_chunks {
            return Err(CinderError::Validation(format!(
                "total mismatch: declared {total}, record says {total_chunks}"
            )));
        }
        if index >= total_chunks {
            return Err(CinderError::Validation(format!(
                "chunk index {index} out of bounds for {total_chunks} chunks"
            )));
        }
        if bytes.len() <= TAG_SIZE || bytes.len() as u64 > chunk_bytes + TAG_SIZE as u64 {
            return Err(CinderError::Validation("chunk body size out of range".into()));
        }

        if index == 0 {
            if let Some(iv_base) = iv_base {
                self.validate_iv(iv_base)?;
                // Set-once: a retried chunk 0 cannot swap the base nonce
                sqlx::query("UPDATE files SET iv_base = ? WHERE id = ? AND iv_base IS NULL")
                    .bind(iv_base)
                    .bind(file_id)
                    .execute(&self.db)
                    .await?;
            }
        }

        let storage_path: String = row.get("storage_path");
        let object = chunk_object_path(&storage_path, index);
        if self.blobs.exists(&object).await? {
            return Ok(());
        }
        self.blobs.write(&object, bytes).await?;
        Ok(())
    }

    /// Metadata for a live file, plus a freshly minted download token:
    /// single-use for whole files, multi-use for chunked ones. A chunked
    /// file whose `iv_base` has not landed yet is not servable.
    pub async fn get_file_meta(&self, id: &str) -> CinderResult<FileMetaResponse> {
        let row = sqlx::query(
            "SELECT file_name, iv_base, total_chunks,
                    encryption_salt, validation_salt, kdf_iterations,
                    encrypted_filename, filename_iv
             FROM files WHERE id = ? AND expires_at >= ?",
        )
        .bind(id)
        .bind(now_secs())
        .fetch_optional(&self.db)
        .await?
        .ok_or(CinderError::Gone)?;

        let iv_base: Option<String> = row.get("iv_base");
        let iv_base = iv_base.ok_or(CinderError::Gone)?;
        let total_chunks = row.get::<i64, _>("total_chunks") as u32;

        let is_multi_use = total_chunks > 1;
        let ttl = if is_multi_use {
            MULTI_USE_TOKEN_TTL_SECS
        } else {
            SINGLE_USE_TOKEN_TTL_SECS
        };
        let token = Self::mint_token();
        let now = now_secs();
        let token_expires_at = now + ttl;

        sqlx::query(
            "INSERT INTO download_tokens (token, file_id, created_at, expires_at, used, is_multi_use)
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(&token)
        .bind(id)
        .bind(now)
        .bind(token_expires_at)
        .bind(is_multi_use)
        .execute(&self.db)
        .await?;

        Ok(FileMetaResponse {
            file_name: row.get("file_name"),
            iv_base,
            total_chunks,
            encryption_salt: row.get("encryption_salt"),
            validation_salt: row.get("validation_salt"),
            kdf_iterations: row
                .get::<Option<i64>, _>("kdf_iterations")
                .map(|i| i as u32),
            encrypted_filename: row.get("encrypted_filename"),
            filename_iv: row.get("filename_iv"),
            download_token: token,
            token_expires_at,
        })
    }

    /// As [`BurnStore::validate_note_passphrase`], for files. Consumes
    /// neither token nor blob.
    pub async fn validate_file_passphrase(&self, id: &str, provided_hash: &str) -> CinderResult<bool> {
        let stored: Option<String> = sqlx::query_scalar(
            "SELECT passphrase_hash FROM files
             WHERE id = ? AND expires_at >= ? AND passphrase_hash IS NOT NULL",
        )
        .bind(id)
        .bind(now_secs())
        .fetch_optional(&self.db)
        .await?;

        Ok(match stored {
            Some(stored) => hashes_match(stored.as_bytes(), provided_hash.as_bytes()),
            None => false,
        })
    }

    /// Whole-file burn: consume the single-use token, hand out the bytes,
    /// destroy blob and metadata. Returns the display name for the
    /// Content-Disposition header alongside the ciphertext.
    ///
    /// Blob deletion after a successful read is best-effort — the recipient
    /// already has the data, and the sweeper reclaims orphans.
    pub async fn download_whole(&self, id: &str, token: &str) -> CinderResult<(String, Vec<u8>)> {
        let consumed = sqlx::query(
            "UPDATE download_tokens SET used = 1
             WHERE token = ? AND file_id = ? AND used = 0 AND is_multi_use = 0
               AND expires_at >= ?
             RETURNING file_id",
        )
        .bind(token)
        .bind(id)
        .bind(now_secs())
        .fetch_optional(&self.db)
        .await?;

        if consumed.is_none() {
            return Err(CinderError::Unauthorized);
        }

        let row = sqlx::query(
            "SELECT file_name, storage_path FROM files WHERE id = ? AND expires_at >= ?",
        )
        .bind(id)
        .bind(now_secs())
        .fetch_optional(&self.db)
        .await?
        .ok_or(CinderError::Gone)?;

        let file_name: String = row.get("file_name");
        let storage_path: String = row.get("storage_path");

        let bytes = self.blobs.read(&storage_path).await?.to_vec();

        if let Err(e) = self.blobs.delete(&storage_path).await {
            tracing::warn!(storage_path, error = %e, "blob delete failed; sweeper will reclaim");
        }
        sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok((file_name, bytes))
    }

    /// Fetch one chunk under a multi-use token. Validates without consuming;
    /// deletes nothing, so chunk downloads can proceed fully in parallel.
    pub async fn download_chunk(
        &self,
        file_id: &str,
        index: u32,
        token: &str,
    ) -> CinderResult<Vec<u8>> {
        let valid: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM download_tokens
             WHERE token = ? AND file_id = ? AND used = 0 AND is_multi_use = 1
               AND expires_at >= ?",
        )
        .bind(token)
        .bind(file_id)
        .bind(now_secs())
        .fetch_optional(&self.db)
        .await?;
        if valid.is_none() {
            return Err(CinderError::Unauthorized);
        }

        let row = sqlx::query(
            "SELECT storage_path, total_chunks FROM files WHERE id = ? AND expires_at >= ?",
        )
        .bind(file_id)
        .bind(now_secs())
        .fetch_optional(&self.db)
        .await?
        .ok_or(CinderError::Gone)?;

        if index >= row.get::<i64, _>("total_chunks") as u32 {
            return Err(CinderError::Validation(format!(
                "chunk index {index} out of bounds"
            )));
        }

        let storage_path: String = row.get("storage_path");
        let object = chunk_object_path(&storage_path, index);

        // A not-yet-uploaded part surfaces as Gone; the recipient retries
        match self.blobs.read(&object).await {
            Ok(buffer) => Ok(buffer.to_vec()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Err(CinderError::Gone),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a chunked file after a completed download. Idempotent: a
    /// finalize that races the sweeper (or a repeat call) reports success
    /// with zero chunks deleted rather than an error.
    pub async fn finalize_chunked(&self, file_id: &str, token: &str) -> CinderResult<FinalizeResponse> {
        let file = sqlx::query("SELECT storage_path, total_chunks FROM files WHERE id = ?")
            .bind(file_id)
            .fetch_optional(&self.db)
            .await?;

        let Some(file) = file else {
            // Already finalized, or reclaimed by the expiry sweeper
            return Ok(FinalizeResponse {
                success: true,
                chunks_deleted: 0,
            });
        };

        let consumed = sqlx::query(
            "UPDATE download_tokens SET used = 1
             WHERE token = ? AND file_id = ? AND used = 0 AND is_multi_use = 1
               AND expires_at >= ?
             RETURNING file_id",
        )
        .bind(token)
        .bind(file_id)
        .bind(now_secs())
        .fetch_optional(&self.db)
        .await?;
        if consumed.is_none() {
            return Err(CinderError::Unauthorized);
        }

        let storage_path: String = file.get("storage_path");
        let total_chunks = file.get::<i64, _>("total_chunks") as u32;

        if let Err(e) = self.blobs.remove_all(&format!("{storage_path}/")).await {
            tracing::warn!(storage_path, error = %e, "chunk removal failed; sweeper will reclaim");
        }
        // Cascades the remaining token rows for this file
        sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(file_id)
            .execute(&self.db)
            .await?;

        Ok(FinalizeResponse {
            success: true,
            chunks_deleted: total_chunks,
        })
    }
}

/// The four passphrase fields travel individually on the whole-file path;
/// reassemble them, insisting on all-or-nothing.
fn whole_file_passphrase(
    params: &WholeFileParams,
) -> CinderResult<Option<cinder_core::types::PassphraseFields>> {
    use cinder_core::types::PassphraseFields;
    match (
        &params.encryption_salt,
        &params.validation_salt,
        params.kdf_iterations,
        &params.passphrase_hash,
    ) {
        (Some(e), Some(v), Some(i), Some(h)) => Ok(Some(PassphraseFields {
            encryption_salt: e.clone(),
            validation_salt: v.clone(),
            kdf_iterations: i,
            passphrase_hash: h.clone(),
        })),
        (None, None, None, None) => Ok(None),
        _ => Err(CinderError::Validation(
            "passphrase fields must be all present or all absent".into(),
        )),
    }
}
