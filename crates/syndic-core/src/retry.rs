use std::time::Duration;

use crate::error::AppError;
use crate::traits::Fetcher;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `max_retries + 1` requests at most.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-indexed): `base * 2^(attempt - 1)`,
    /// capped at `max_backoff`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .backoff_base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff);
        delay.min(self.max_backoff)
    }
}

/// A [`Fetcher`] wrapper adding a per-request timeout and retries of
/// transient failures. Shape errors and non-retryable statuses pass straight
/// through.
#[derive(Debug, Clone)]
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
    timeout: Duration,
}

impl<F: Fetcher> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            inner,
            policy,
            timeout,
        }
    }

    async fn attempt(&self, url: &str) -> Result<String, AppError> {
        match tokio::time::timeout(self.timeout, self.inner.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(self.timeout.as_secs())),
        }
    }
}

impl<F: Fetcher> Fetcher for RetryingFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let mut retries = 0;
        loop {
            match self.attempt(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && retries < self.policy.max_retries => {
                    retries += 1;
                    let delay = self.policy.delay_for_attempt(retries);
                    tracing::debug!(
                        %url,
                        error = %e,
                        retry = retries,
                        delay_ms = %delay.as_millis(),
                        "Retrying fetch"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
