//! Retry logic for transient step failures
//!
//! Exponential backoff with jitter, bounded by a small attempt cap. Only
//! errors the taxonomy classifies as transient are retried; fatal provider
//! errors (auth, invalid request) and timeouts fail the step immediately.
//! The backoff sleep is a cancellation suspension point.

use crate::{OrchestratorError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Retry strategy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,

    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,

    /// Whether to add random jitter to backoff delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a configuration with a custom retry cap
    pub fn new(max_retries: u32, initial_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff_ms,
            ..Default::default()
        }
    }

    /// Calculate the backoff delay for a given attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powi(attempt as i32)) as u64;
        let delay_ms = delay_ms.min(self.max_backoff_ms);

        let delay_ms = if self.jitter {
            // Up to 25% random jitter keeps concurrent retries from herding
            let jitter_amount = (delay_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
            delay_ms + jitter_amount
        } else {
            delay_ms
        };

        Duration::from_millis(delay_ms)
    }
}

/// Execute an operation with retry on transient failures
///
/// `on_retry` runs before each backoff sleep so callers can persist the
/// retrying status and emit events.
pub async fn retry_with_backoff<F, Fut, T, R, RFut>(
    config: &RetryConfig,
    operation_name: &str,
    cancel: &CancellationToken,
    mut f: F,
    mut on_retry: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    R: FnMut(u32) -> RFut,
    RFut: Future<Output = ()>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            info!(
                operation = operation_name,
                attempt,
                max_retries = config.max_retries,
                "retrying operation"
            );
            on_retry(attempt).await;

            let delay = config.backoff_delay(attempt - 1);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
            }
        }

        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %e,
                    "transient failure"
                );
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error
        .unwrap_or_else(|| OrchestratorError::Internal("retry loop exhausted".to_string())))
}
