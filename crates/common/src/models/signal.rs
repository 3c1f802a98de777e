use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// +1 for BUY, -1 for SELL. Multiplying a price move by this gives the
    /// move in the trade's favour.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub sma: f64,
    pub rsi_period: usize,
    pub sma_period: usize,
}

/// A directional call produced once per cycle. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub instrument: String,
    pub direction: Direction,
    pub confidence: f64,
    pub snapshot: IndicatorSnapshot,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// A signal after cross-checking against the secondary source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedSignal {
    pub signal: Signal,
    pub confirmed: bool,
    pub confidence: f64,
    /// Set when the secondary source could not be consulted and the
    /// validator let the signal through anyway (demo mode only).
    pub unverified: bool,
}
