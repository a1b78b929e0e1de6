use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Attempts made before giving up.
pub const RETRY_ATTEMPTS: u32 = 10;
/// Fixed pause between attempts. No backoff, no jitter.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Run an idempotent operation until it succeeds or the attempt budget is
/// spent, returning the first success or the final error. Meant for
/// GET-style calls where a transport hiccup is worth riding out.
pub async fn with_retry<F, Fut, T, E>(mut op: F, what: &str) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < RETRY_ATTEMPTS => {
                warn!(attempt, error = %err, "{what} failed, retrying");
                attempt += 1;
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(err) => return Err(err),
        }
    }
}
