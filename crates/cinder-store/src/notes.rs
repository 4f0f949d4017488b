//! Note operations: create, metadata, passphrase validation, atomic burn.

use sqlx::Row;
use uuid::Uuid;

use cinder_core::types::{CreateNoteRequest, FetchNoteResponse, NoteMetaResponse};
use cinder_core::{CinderError, CinderResult};
use cinder_crypto::kdf::hashes_match;

use crate::now_secs;
use crate::store::BurnStore;

impl BurnStore {
    /// Insert a new note record. The ciphertext is opaque to the server.
    pub async fn create_note(&self, req: &CreateNoteRequest) -> CinderResult<String> {
        if req.views < 1 || req.views > self.limits.max_views {
            return Err(CinderError::Validation(format!(
                "views must be between 1 and {}",
                self.limits.max_views
            )));
        }
        self.validate_expiry(req.expires_at)?;
        self.validate_iv(&req.iv)?;
        if req.ciphertext.is_empty() {
            return Err(CinderError::Validation("empty ciphertext".into()));
        }
        self.validate_passphrase_fields(req.passphrase.as_ref())?;

        let id = Uuid::new_v4().to_string();
        let p = req.passphrase.as_ref();

        sqlx::query(
            "INSERT INTO notes (id, ciphertext, iv, created_at, expires_at, views_left,
                                encryption_salt, validation_salt, kdf_iterations, passphrase_hash)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&req.ciphertext)
        .bind(&req.iv)
        .bind(now_secs())
        .bind(req.expires_at)
        .bind(req.views as i64)
        .bind(p.map(|p| p.encryption_salt.as_str()))
        .bind(p.map(|p| p.validation_salt.as_str()))
        .bind(p.map(|p| p.kdf_iterations as i64))
        .bind(p.map(|p| p.passphrase_hash.as_str()))
        .execute(&self.db)
        .await?;

        Ok(id)
    }

    /// Passphrase parameters for a live passphrase-mode note. Never consumes
    /// a view; link-mode and dead notes are both `Gone`.
    pub async fn get_note_meta(&self, id: &str) -> CinderResult<NoteMetaResponse> {
        let row = sqlx::query(
            "SELECT validation_salt, encryption_salt, kdf_iterations
             FROM notes
             WHERE id = ? AND expires_at >= ? AND views_left > 0
               AND passphrase_hash IS NOT NULL",
        )
        .bind(id)
        .bind(now_secs())
        .fetch_optional(&self.db)
        .await?
        .ok_or(CinderError::Gone)?;

        Ok(NoteMetaResponse {
            validation_salt: row.get("validation_salt"),
            encryption_salt: row.get("encryption_salt"),
            iterations: row.get::<i64, _>("kdf_iterations") as u32,
        })
    }

    /// Compare a candidate validation hash against the stored one. Returns
    /// false for dead records, link-mode records and wrong hashes alike —
    /// the caller learns nothing about which condition failed. Never
    /// consumes a view.
    pub async fn validate_note_passphrase(&self, id: &str, provided_hash: &str) -> CinderResult<bool> {
        let stored: Option<String> = sqlx::query_scalar(
            "SELECT passphrase_hash FROM notes
             WHERE id = ? AND expires_at >= ? AND views_left > 0
               AND passphrase_hash IS NOT NULL",
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

    /// Atomic decrement-or-fetch. A single UPDATE serializes concurrent
    /// callers on the row: with one view left, exactly one caller gets the
    /// ciphertext and the rest see `Gone`. The record is deleted once the
    /// final view is spent.
    pub async fn burn_and_fetch_note(&self, id: &str) -> CinderResult<FetchNoteResponse> {
        let mut tx = self.db.begin().await?;

        let row = sqlx::query(
            "UPDATE notes SET views_left = views_left - 1
             WHERE id = ? AND expires_at >= ? AND views_left > 0
             RETURNING ciphertext, iv, views_left",
        )
        .bind(id)
        .bind(now_secs())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(CinderError::Gone)?;

        let response = FetchNoteResponse {
            ciphertext: row.get("ciphertext"),
            iv: row.get("iv"),
        };

        if row.get::<i64, _>("views_left") <= 0 {
            sqlx::query("DELETE FROM notes WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(response)
    }
}
