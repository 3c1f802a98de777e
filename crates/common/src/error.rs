use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Not enough history, or a nonsensical window length.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndicatorError {
    #[error("insufficient data: need at least {required} prices, got {actual}")]
    InsufficientData { required: usize, actual: usize },
    #[error("indicator period must be positive")]
    InvalidPeriod,
}

/// Candle data that violates the series invariants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("candle at {0} has a negative or non-finite price")]
    NegativePrice(DateTime<Utc>),
    #[error("candle at {0} has a negative or non-finite volume")]
    NegativeVolume(DateTime<Utc>),
    #[error("candle at {0} has high/low outside its open/close")]
    InconsistentRange(DateTime<Utc>),
    #[error("candles out of order: {next} does not follow {previous}")]
    OutOfOrder {
        previous: DateTime<Utc>,
        next: DateTime<Utc>,
    },
}

/// Failure talking to an external collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{dependency} timed out after {after:?}")]
    Timeout {
        dependency: String,
        after: Duration,
    },
    #[error("{dependency} unreachable: {reason}")]
    Connect { dependency: String, reason: String },
    #[error("{dependency} answered HTTP {status}: {body}")]
    Http {
        dependency: String,
        status: u16,
        body: String,
    },
    #[error("{dependency} rate limit hit")]
    RateLimited { dependency: String },
    #[error("{dependency} sent an unreadable response: {reason}")]
    Decode { dependency: String, reason: String },
    #[error("{dependency} refused the request: {reason}")]
    Rejected { dependency: String, reason: String },
    /// The trade reached the venue but could not be settled. Resending would
    /// open a second position.
    #[error("{dependency} could not settle the trade: {reason}")]
    Unsettled { dependency: String, reason: String },
}

impl ProviderError {
    /// Whether a read-only call (candle fetch, balance) may be tried again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connect { .. } | Self::RateLimited { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Decode { .. } | Self::Rejected { .. } | Self::Unsettled { .. } => false,
        }
    }

    /// Whether a trade submission may be sent again. Only a failure to
    /// connect proves the first request never reached the venue.
    pub fn is_safe_to_resubmit(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }
}

/// Returned instead of calling a dependency whose breaker is open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("circuit breaker for {dependency} is open")]
pub struct CircuitOpenError {
    pub dependency: String,
}

/// Invalid startup configuration. Always fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(String),
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}
