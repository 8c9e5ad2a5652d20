use crate::config::RetrySettings;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Calculate the delay for the next retry attempt with exponential backoff.
pub fn next_retry_delay(attempt: usize, base_ms: u64, max_ms: u64) -> Duration {
    let multiplier = 2_u64.saturating_pow(attempt as u32);
    let delay = base_ms.saturating_mul(multiplier);
    // Jitter up to one base interval
    let jitter = rand::random::<u64>() % base_ms.max(1);
    let total = delay.saturating_add(jitter);
    Duration::from_millis(total.min(max_ms))
}

/// Execute an async operation, retrying only errors `is_retryable` accepts.
pub async fn retry_async_if<T, E, F, Fut, P>(
    operation_name: &str,
    settings: RetrySettings,
    is_retryable: P,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = settings.max_attempts.max(1) as usize;
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if !is_retryable(&e) {
                    return Err(e);
                }
                if attempt >= max_attempts {
                    error!(
                        "Failed to execute '{}' after {} attempts: {}",
                        operation_name, max_attempts, e
                    );
                    return Err(e);
                }
                let delay =
                    next_retry_delay(attempt, settings.base_delay_ms, settings.max_delay_ms);
                warn!(
                    "Operation '{}' failed. Retrying in {:?} (Attempt {}/{}): {}",
                    operation_name, delay, attempt, max_attempts, e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
