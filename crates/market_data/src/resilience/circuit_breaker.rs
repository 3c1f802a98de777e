use std::fmt;

use common::config::BreakerConfig;
use common::error::CircuitOpenError;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("CLOSED"),
            Self::Open => f.write_str("OPEN"),
            Self::HalfOpen => f.write_str("HALF_OPEN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSnapshot {
    pub dependency: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub last_failure: Option<Instant>,
}

/// Per-dependency circuit breaker.
///
/// CLOSED counts consecutive failures and opens at the threshold. OPEN
/// refuses every call until the cool-down has passed, then lets exactly one
/// trial through as HALF_OPEN. The trial's result closes the breaker or
/// reopens it with a fresh cool-down.
#[derive(Debug)]
pub struct CircuitBreaker {
    dependency: String,
    config: BreakerConfig,
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(dependency: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            dependency: dependency.into(),
            config,
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure: None,
            opened_at: None,
            trial_in_flight: false,
        }
    }

    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            dependency: self.dependency.clone(),
            state: self.state,
            failure_count: self.failure_count,
            last_failure: self.last_failure,
        }
    }

    /// Asks permission to make one call. Must be paired with
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure) when it returns `Ok`.
    pub fn try_acquire(&mut self) -> Result<(), CircuitOpenError> {
        match self.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let cooled = self
                    .opened_at
                    .is_none_or(|at| at.elapsed() >= self.config.cooldown);
                if cooled {
                    info!(
                        "Circuit breaker for {} half-open, admitting trial call",
                        self.dependency
                    );
                    self.state = BreakerState::HalfOpen;
                    self.trial_in_flight = true;
                    Ok(())
                } else {
                    Err(self.open_error())
                }
            }
            BreakerState::HalfOpen => {
                if self.trial_in_flight {
                    Err(self.open_error())
                } else {
                    self.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state != BreakerState::Closed {
            info!("Circuit breaker for {} closed", self.dependency);
        }
        self.state = BreakerState::Closed;
        self.failure_count = 0;
        self.opened_at = None;
        self.trial_in_flight = false;
    }

    /// Gives back a trial slot whose call never finished. The breaker stays
    /// HALF_OPEN and admits the next caller as the trial.
    pub fn release_trial(&mut self) {
        if self.state == BreakerState::HalfOpen {
            self.trial_in_flight = false;
        }
    }

    pub fn record_failure(&mut self) {
        let now = Instant::now();
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(now);

        match self.state {
            BreakerState::HalfOpen => {
                warn!(
                    "Trial call to {} failed, circuit breaker reopened",
                    self.dependency
                );
                self.open(now);
            }
            BreakerState::Closed if self.failure_count >= self.config.failure_threshold => {
                warn!(
                    "Circuit breaker for {} opened after {} consecutive failures",
                    self.dependency, self.failure_count
                );
                self.open(now);
            }
            _ => {}
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
    }

    fn open_error(&self) -> CircuitOpenError {
        CircuitOpenError {
            dependency: self.dependency.clone(),
        }
    }
}
