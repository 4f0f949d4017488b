//! Bounded retry with exponential backoff for chunk transfers.

use std::future::Future;
use std::time::Duration;

use cinder_core::{CinderError, CinderResult};

/// Run `op` up to `attempts` times, doubling the delay after each failure.
/// Validation, Gone and Unauthorized errors are terminal — retrying cannot
/// change the answer.
pub(crate) async fn with_backoff<T, F, Fut>(
    attempts: u32,
    base: Duration,
    mut op: F,
) -> CinderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CinderResult<T>>,
{
    let mut delay = base;
    let mut last_err = None;

    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(
                e @ (CinderError::Validation(_)
                | CinderError::Gone
                | CinderError::Unauthorized
                | CinderError::AuthFailure),
            ) => return Err(e),
            Err(e) => {
                tracing::debug!(attempt, error = %e, "transfer attempt failed");
                last_err = Some(e);
                if attempt + 1 < attempts {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| CinderError::Validation("zero retry attempts".into())))
}
