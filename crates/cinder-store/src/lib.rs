//! cinder-store: server-side state for the burn protocol
//!
//! Owns four SQLite tables (notes, files, download_tokens, rate_limits) and
//! one blob-store namespace behind an OpenDAL [`opendal::Operator`]. All
//! mutation goes through single-statement transactional primitives so that
//! concurrent reveals of the same secret serialize on the row: a 1-view note
//! yields exactly one ciphertext, a single-use token is consumed exactly
//! once.
//!
//! The store never sees plaintext, encryption keys or passphrases — only
//! ciphertext, salts and the validation hash.

pub mod blob;
pub mod files;
pub mod notes;
pub mod ratelimit;
pub mod store;
pub mod sweep;

pub use blob::{build_operator, check_health};
pub use ratelimit::{Decision, RateLimiter};
pub use store::BurnStore;
pub use sweep::SweepReport;

use time::OffsetDateTime;

/// Current time as Unix seconds.
pub(crate) fn now_secs() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Current time as Unix milliseconds (rate-limiter resolution).
pub(crate) fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
