use std::future::Future;
use std::time::Duration;

use common::config::RetryConfig;
use common::error::ProviderError;
use tokio::time::sleep;
use tracing::warn;

use crate::resilience::CallError;

/// Exponential backoff: `min(max_delay, base * 2^attempt)`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max_delay: Duration,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self {
            base,
            max_delay,
            attempt: 0,
        }
    }

    /// Calculate the next delay and increment the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self
            .base
            .saturating_mul(2u32.saturating_pow(self.attempt))
            .min(self.max_delay);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Which failures are worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOn {
    /// Read-only calls: timeouts, connection failures, rate limits, 5xx.
    Transient,
    /// Trade submission: only failures proving nothing was sent.
    NeverSent,
}

impl RetryOn {
    fn allows(&self, err: &ProviderError) -> bool {
        match self {
            Self::Transient => err.is_retryable(),
            Self::NeverSent => err.is_safe_to_resubmit(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retry_on: RetryOn,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig, retry_on: RetryOn) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            retry_on,
        }
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.base_delay, self.max_delay)
    }
}

/// Runs `op` until it succeeds, fails with something the policy does not
/// retry, or runs out of attempts. An open circuit is never retried.
/// `on_retry` sees the attempt number about to start, the error and the
/// delay before it.
pub async fn retry_with_backoff<T, F, Fut, R>(
    policy: &RetryPolicy,
    mut op: F,
    mut on_retry: R,
) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
    R: FnMut(u32, &ProviderError, Duration),
{
    let mut backoff = policy.backoff();
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(CallError::Provider(err))
                if attempt < policy.max_attempts && policy.retry_on.allows(&err) =>
            {
                let delay = backoff.next_delay();
                attempt += 1;
                warn!(
                    "{}; retrying in {:?} (attempt {}/{})",
                    err, delay, attempt, policy.max_attempts
                );
                on_retry(attempt, &err, delay);
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
