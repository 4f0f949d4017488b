//! Per-IP, per-endpoint sliding-window rate limiter.
//!
//! Each admitted request appends a `(key, scope, timestamp, ip)` row; a check
//! counts rows inside the window and rejects once the per-endpoint budget is
//! spent, with a Retry-After derived from when the oldest in-window entry
//! ages out. Entries older than the window are garbage-collected
//! opportunistically on every check; the sweeper purges anything older than
//! an hour.
//!
//! The limiter **fails open**: on any store error the request is admitted
//! (with one count charged against the advertised remainder). It exists for
//! noise reduction, not access control — do not flip this to fail-closed
//! without revisiting that contract.

use sqlx::{Pool, Sqlite};

use crate::now_millis;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admitted { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    db: Pool<Sqlite>,
    window_millis: i64,
}

impl RateLimiter {
    /// Standard one-minute window.
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self::with_window(db, 60_000)
    }

    pub fn with_window(db: Pool<Sqlite>, window_millis: i64) -> Self {
        Self { db, window_millis }
    }

    /// Admit or reject one request from `ip` against the `scope` endpoint
    /// budget of `max` requests per window.
    pub async fn check(&self, ip: &str, scope: &str, max: u32) -> Decision {
        match self.try_check(ip, scope, max).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(ip, scope, error = %e, "rate limiter backend error; failing open");
                Decision::Admitted {
                    remaining: max.saturating_sub(1),
                }
            }
        }
    }

    async fn try_check(&self, ip: &str, scope: &str, max: u32) -> Result<Decision, sqlx::Error> {
        let key = format!("rate_limit:{ip}");
        let now = now_millis();
        let window_start = now - self.window_millis;

        // Opportunistic GC of aged-out entries for this key
        sqlx::query("DELETE FROM rate_limits WHERE key = ? AND scope = ? AND ts < ?")
            .bind(&key)
            .bind(scope)
            .bind(window_start)
            .execute(&self.db)
            .await?;

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM rate_limits WHERE key = ? AND scope = ? AND ts >= ?")
                .bind(&key)
                .bind(scope)
                .bind(window_start)
                .fetch_one(&self.db)
                .await?;

        if count >= max as i64 {
            let oldest: Option<i64> =
                sqlx::query_scalar("SELECT MIN(ts) FROM rate_limits WHERE key = ? AND scope = ? AND ts >= ?")
                    .bind(&key)
                    .bind(scope)
                    .bind(window_start)
                    .fetch_one(&self.db)
                    .await?;

            let retry_after_millis = oldest
                .map(|ts| (ts + self.window_millis - now).max(0))
                .unwrap_or(self.window_millis);
            return Ok(Decision::Limited {
                // Ceiling so the client never retries a moment too early
                retry_after_secs: (retry_after_millis as u64).div_ceil(1000).max(1),
            });
        }

        sqlx::query("INSERT INTO rate_limits (key, scope, ts, ip) VALUES (?, ?, ?, ?)")
            .bind(&key)
            .bind(scope)
            .bind(now)
            .bind(ip)
            .execute(&self.db)
            .await?;

        Ok(Decision::Admitted {
            remaining: max.saturating_sub(count as u32 + 1),
        })
    }
}
