use std::future::Future;
use std::sync::{Mutex as SyncMutex, MutexGuard, PoisonError};
use std::time::Duration;

use common::config::{BreakerConfig, RateLimit};
use common::error::{CircuitOpenError, ProviderError};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::resilience::{BreakerSnapshot, CircuitBreaker, RateLimiter};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Everything a call to one external dependency goes through: its circuit
/// breaker, its rate limiter and a per-call timeout.
#[derive(Debug)]
pub struct Guard {
    dependency: String,
    breaker: SyncMutex<CircuitBreaker>,
    limiter: Mutex<RateLimiter>,
    call_timeout: Duration,
}

impl Guard {
    pub fn new(
        dependency: impl Into<String>,
        breaker: BreakerConfig,
        rate: RateLimit,
        call_timeout: Duration,
    ) -> Self {
        let dependency = dependency.into();
        Self {
            breaker: SyncMutex::new(CircuitBreaker::new(dependency.clone(), breaker)),
            limiter: Mutex::new(RateLimiter::new(dependency.clone(), rate)),
            dependency,
            call_timeout,
        }
    }

    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub async fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker().snapshot()
    }

    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `call` unless the breaker is open. The future is not polled at
    /// all when the breaker refuses. A timeout counts as a failure, and so
    /// does every provider error except an explicit refusal, which proves
    /// the dependency is up.
    pub async fn call<T, F>(&self, call: F) -> Result<T, CallError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        self.breaker().try_acquire()?;
        let mut permit = Permit {
            guard: self,
            settled: false,
        };
        self.limiter.lock().await.acquire().await;

        let result = match timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                dependency: self.dependency.clone(),
                after: self.call_timeout,
            }),
        };

        let mut breaker = self.breaker();
        match &result {
            Ok(_) | Err(ProviderError::Rejected { .. }) => breaker.record_success(),
            Err(err) => {
                debug!("Call to {} failed: {}", self.dependency, err);
                breaker.record_failure();
            }
        }
        permit.settled = true;
        drop(breaker);

        result.map_err(CallError::from)
    }
}

/// Releases the breaker slot of a call that was dropped before it finished.
struct Permit<'a> {
    guard: &'a Guard,
    settled: bool,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("Call to {} abandoned", self.guard.dependency);
            self.guard.breaker().release_trial();
        }
    }
}
