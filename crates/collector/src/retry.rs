use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Wait `interval` before each call of `f`, up to `max_retries` calls.
/// Returns the first success or the last error. A `max_retries` of zero is
/// treated as one. No backoff growth and no jitter.
pub async fn with_retry<T, E, F, Fut>(interval: Duration, max_retries: u32, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_retries = max_retries.max(1);
    let mut attempt = 1;
    loop {
        tokio::time::sleep(interval).await;
        match f().await {
            Ok(v) => return Ok(v),
            Err(err) if attempt < max_retries => {
                warn!(attempt, max_retries, error = %err, "attempt failed, retrying");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
