//! Bounded retry with exponential backoff for flaky external calls.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Run `operation` up to `1 + max_retries` times, doubling the delay
/// after each failure.
pub async fn retry_async<F, Fut, T, E>(
    operation_name: &str,
    max_retries: u32,
    base_delay: Duration,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_retries => {
                let delay = base_delay.saturating_mul(2u32.saturating_pow(attempt));
                attempt += 1;
                debug!(
                    "{} attempt {} failed, retrying in {:?}: {}",
                    operation_name, attempt, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_immediately_without_retry() {
        let calls = AtomicU32::new(0);
        let result = retry_async("test", 2, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(7) }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_within_budget() {
        let calls = AtomicU32::new(0);
        let result = retry_async("test", 2, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient")
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_async("test", 2, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("still broken") }
        })
        .await;
        assert_eq!(result, Err("still broken"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
