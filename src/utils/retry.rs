/// Retry of recoverable provider failures on a fixed backoff schedule
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::Result;

/// Run `op`, retrying once per entry in `backoffs` while the error is
/// recoverable. The last error is returned when the schedule runs out.
pub async fn with_retry<T, F, Fut>(label: &str, backoffs: &[Duration], mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_recoverable() && attempt < backoffs.len() => {
                let wait = backoffs[attempt];
                attempt += 1;
                warn!(
                    op = label,
                    attempt,
                    error = %e,
                    code = e.error_code(),
                    "Recoverable failure, retrying in {:?}",
                    wait
                );
                tokio::time::sleep(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}
