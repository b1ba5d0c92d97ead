//! Generic bounded-retry wrapper for operations with transient failure modes.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Run `op` up to `attempts` times, sleeping `backoff` between tries. Only
/// errors classified transient by `is_transient` are retried; any other error
/// propagates immediately, as does the last error once attempts are exhausted.
pub async fn retry_transient<T, E, F, Fut, P>(
    attempts: u32,
    backoff: Duration,
    is_transient: P,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && is_transient(&e) => {
                tracing::debug!(attempt, error = %e, "Transient error, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
