use thiserror::Error;

pub type CinderResult<T> = Result<T, CinderError>;

/// Error taxonomy shared across the workspace.
///
/// `Gone` deliberately covers "never existed", "expired" and "already
/// consumed" — callers must not be able to tell them apart.
#[derive(Debug, Error)]
pub enum CinderError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("gone")]
    Gone,

    #[error("unauthorized")]
    Unauthorized,

    #[error("authentication failure")]
    AuthFailure,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage error: {0}")]
    Storage(#[from] opendal::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CinderError {
    /// True for errors that leave no trace of whether the record ever existed.
    pub fn is_gone(&self) -> bool {
        matches!(self, CinderError::Gone)
    }
}
