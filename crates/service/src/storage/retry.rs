use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

use crate::errors::{Operation, ProviderError, StorageError};
use crate::observability::{STORAGE_EXHAUSTED_TOTAL, STORAGE_RETRIES_TOTAL};

/// Timeout and exponential backoff applied to every provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    timeout: Duration,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl Default for RetryPolicy {
    /// 3 retries, 5 s per attempt, 100 ms x 2^attempt backoff capped at 5 s.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5), Duration::from_millis(100), Duration::from_secs(5))
    }
}

impl From<&configs::RetryConfig> for RetryPolicy {
    fn from(cfg: &configs::RetryConfig) -> Self {
        Self::new(cfg.max_retries, cfg.timeout(), cfg.backoff_base(), cfg.backoff_max())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, timeout: Duration, backoff_base: Duration, backoff_max: Duration) -> Self {
        Self { max_retries, timeout, backoff_base, backoff_max }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay after the failed attempt with 0-based index `failed_attempt`.
    pub fn backoff_for(&self, failed_attempt: u32) -> Duration {
        let factor = 2_u32.checked_pow(failed_attempt).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }

    async fn wait_before_retry(&self, attempt: u32) {
        if attempt == 0 {
            return;
        }
        let backoff = self.backoff_for(attempt - 1);
        debug!("Retrying in {:?} (attempt {})", backoff, attempt + 1);
        sleep(backoff).await;
    }

    /// Run `attempt_fn` until it succeeds or the attempts run out.
    ///
    /// Each attempt races against the policy timeout; the losing future is
    /// dropped without notifying the provider.
    pub async fn run<F, Fut, T>(&self, operation: Operation, key: &str, mut attempt_fn: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.max_attempts();
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                STORAGE_RETRIES_TOTAL.with_label_values(&[operation.as_str()]).inc();
                self.wait_before_retry(attempt).await;
            }

            let outcome = match timeout(self.timeout, attempt_fn()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.timeout)),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(%operation, key, "operation succeeded after {} retries", attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!(%operation, key, attempt = attempt + 1, error = %e, "storage attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let cause = last_error.unwrap_or_else(|| ProviderError::Backend("no attempt was made".into()));
        error!(%operation, key, attempts, error = %cause, "storage operation exhausted retries");
        STORAGE_EXHAUSTED_TOTAL.with_label_values(&[operation.as_str()]).inc();
        Err(StorageError::Exhausted { operation, key: key.to_string(), attempts, cause })
    }
}
