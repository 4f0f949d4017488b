//! Expiry sweeper: bounds the lifetime of expired records, dead tokens,
//! stale rate-limit entries, and orphaned blobs from partial failures.

use sqlx::Row;

use cinder_core::CinderResult;

use crate::store::BurnStore;
use crate::{now_millis, now_secs};

/// Rate-limit rows older than this are purged.
const RATE_LIMIT_RETENTION_MILLIS: i64 = 60 * 60 * 1000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub notes: u64,
    pub files: u64,
    pub tokens: u64,
    pub rate_entries: u64,
}

impl BurnStore {
    /// Delete everything past its expiry. Blob removal failures are logged
    /// and retried on the next sweep — the metadata row is only dropped
    /// after the blob delete attempt, so nothing is lost track of.
    pub async fn sweep_expired(&self) -> CinderResult<SweepReport> {
        let now = now_secs();
        let mut report = SweepReport::default();

        // Notes: expired, or fully burned (views spent)
        report.notes = sqlx::query("DELETE FROM notes WHERE expires_at < ? OR views_left <= 0")
            .bind(now)
            .execute(&self.db)
            .await?
            .rows_affected();

        let expired_files =
            sqlx::query("SELECT id, storage_path, total_chunks FROM files WHERE expires_at < ?")
                .bind(now)
                .fetch_all(&self.db)
                .await?;

        for row in expired_files {
            let id: String = row.get("id");
            let storage_path: String = row.get("storage_path");
            let total_chunks: i64 = row.get("total_chunks");

            let removed = if total_chunks > 1 {
                self.blobs.remove_all(&format!("{storage_path}/")).await
            } else {
                match self.blobs.delete(&storage_path).await {
                    // Blob already gone (compensated create, prior burn)
                    Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(()),
                    other => other,
                }
            };
            if let Err(e) = removed {
                tracing::warn!(storage_path, error = %e, "sweep: blob removal failed, will retry");
                continue;
            }

            sqlx::query("DELETE FROM files WHERE id = ?")
                .bind(&id)
                .execute(&self.db)
                .await?;
            report.files += 1;
        }

        report.tokens = sqlx::query("DELETE FROM download_tokens WHERE expires_at < ?")
            .bind(now)
            .execute(&self.db)
            .await?
            .rows_affected();

        report.rate_entries = sqlx::query("DELETE FROM rate_limits WHERE ts < ?")
            .bind(now_millis() - RATE_LIMIT_RETENTION_MILLIS)
            .execute(&self.db)
            .await?
            .rows_affected();

        if report != SweepReport::default() {
            tracing::info!(
                notes = report.notes,
                files = report.files,
                tokens = report.tokens,
                rate_entries = report.rate_entries,
                "sweep: reclaimed expired records"
            );
        }

        Ok(report)
    }
}
