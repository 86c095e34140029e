use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};

/// Exponential backoff policy: `initial_delay * backoff_factor^(attempt - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::rpc()
    }
}

impl RetryPolicy {
    /// Per-call retry budget for RPC operations against a single endpoint.
    pub fn rpc() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 2_000,
            max_delay_ms: 120_000,
            backoff_factor: 2.0,
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_factor: 1.0,
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms = (self.initial_delay_ms as f64 * self.backoff_factor.powi(exponent))
            .min(self.max_delay_ms as f64);
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }
}

/// Run `operation` until it succeeds, fails with an error `is_retryable` rejects,
/// or the attempt budget is spent. The last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
