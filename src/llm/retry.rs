//! Exponential backoff retry logic for inference attempts.

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use tracing::warn;

/// Default number of total attempts.
pub const MAX_ATTEMPTS: u32 = 3;
const INITIAL_INTERVAL_SECS: u64 = 1;
const MAX_INTERVAL_SECS: u64 = 30;

/// Retry an async operation with exponential backoff.
///
/// `attempt` receives the 1-based attempt number and is called at most
/// `max_attempts` times. Errors for which `is_retryable` returns false are
/// returned immediately, unwrapped. Once attempts run out, the last error is
/// passed to `wrap_exhausted` together with the number of attempts made.
pub async fn retry_with_backoff<T, E, Fut, F, R, W>(
    max_attempts: u32,
    mut attempt: F,
    is_retryable: R,
    wrap_exhausted: W,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    W: FnOnce(u32, E) -> E,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut backoff = ExponentialBackoff {
        initial_interval: Duration::from_secs(INITIAL_INTERVAL_SECS),
        max_interval: Duration::from_secs(MAX_INTERVAL_SECS),
        max_elapsed_time: None,
        ..Default::default()
    };

    let mut attempts = 0;
    loop {
        attempts += 1;

        let err = match attempt(attempts).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !is_retryable(&err) {
            return Err(err);
        }

        if attempts >= max_attempts {
            return Err(wrap_exhausted(attempts, err));
        }

        warn!("Attempt {}/{} failed: {}", attempts, max_attempts, err);
        if let Some(wait_duration) = backoff.next_backoff() {
            tokio::time::sleep(wait_duration).await;
        }
    }
}
