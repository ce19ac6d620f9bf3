//! Retry utilities for outbound requests
//!
//! A single retry loop with a fixed delay between attempts and a predicate
//! deciding which errors are worth another attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try
    pub max_retries: u32,

    /// Delay in milliseconds before every retry
    pub delay_ms: u64,
}

impl RetryConfig {
    /// Fixed delay between every attempt
    pub fn fixed(max_retries: u32, delay_ms: u64) -> Self {
        Self {
            max_retries,
            delay_ms,
        }
    }

    fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Execute an operation, retrying only errors accepted by `should_retry`
///
/// The operation receives the zero-based attempt number. Returns the first
/// success, the first non-retryable error, or the last error once
/// `max_retries` retries are exhausted.
///
/// # Example
///
/// ```no_run
/// use nodewatch::utils::retry::{with_retry_if, RetryConfig};
///
/// # async fn example() -> Result<u32, String> {
/// let config = RetryConfig::fixed(2, 1000);
/// with_retry_if(
///     &config,
///     |attempt| async move { if attempt < 1 { Err("timeout".to_string()) } else { Ok(attempt) } },
///     |e: &String| e.contains("timeout"),
/// )
/// .await
/// # }
/// ```
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation: F,
    should_retry: P,
) -> Result<T, E>
where
    E: Display,
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if !should_retry(&e) {
                    debug!(attempt, error = %e, "Non-retryable error encountered");
                    return Err(e);
                }

                if attempt >= config.max_retries {
                    debug!(attempt, max_retries = config.max_retries, error = %e, "Retries exhausted");
                    return Err(e);
                }

                attempt += 1;
                let delay = config.delay();
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying operation after delay"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
