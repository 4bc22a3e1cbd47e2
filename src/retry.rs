//! Retry with exponential backoff for remote calls.

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::ClientError;

/// Classifies errors as transient (worth retrying) or permanent.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ClientError {
    fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_timeout() || e.is_connect(),
            // 4xx won't succeed on a second try
            ClientError::Status { status, .. } => *status >= 500,
            ClientError::Decode { .. } => false,
            ClientError::Offline => false,
        }
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the retry
/// budget in `config` is spent. Returns the last error in the latter cases.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                    .min(config.max_delay);
            }
            Err(e) => {
                if attempt > 0 {
                    tracing::warn!(error = %e, attempts = attempt + 1, "Retry budget exhausted");
                }
                return Err(e);
            }
        }
    }
}
