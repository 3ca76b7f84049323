//! Retry with exponential backoff for transient warehouse failures.
//!
//! Terminal failures after the final attempt surface as
//! `UpstreamUnavailable`; non-transient errors (bad input, unknown tenant)
//! never retry.

use adpulse_core::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy for transient upstream failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // 100ms, 400ms, 1600ms between the three attempts
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            backoff_multiplier: 4.0,
        }
    }
}

impl RetryPolicy {
    /// Run `op` under this policy.
    ///
    /// Retries only while the returned error is transient; the last error is
    /// wrapped into `UpstreamUnavailable` naming the failed operation.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay_ms = self.initial_delay_ms as f64;
        let mut last_err: Option<Error> = None;

        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        operation = what,
                        attempt,
                        delay_ms = delay_ms as u64,
                        error = %err,
                        "Transient upstream failure, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
                    delay_ms *= self.backoff_multiplier;
                    last_err = Some(err);
                }
                Err(err) if err.is_transient() => {
                    last_err = Some(err);
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        let detail = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        Err(Error::upstream(format!("{what} failed after retries: {detail}")))
    }
}
