use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Direction, ValidatedSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    Demo,
    Real,
}

impl TradeMode {
    pub fn is_real(&self) -> bool {
        matches!(self, Self::Real)
    }
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Demo => f.write_str("demo"),
            Self::Real => f.write_str("real"),
        }
    }
}

impl FromStr for TradeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "demo" => Ok(Self::Demo),
            "real" => Ok(Self::Real),
            other => Err(format!("unknown trading mode '{}'", other)),
        }
    }
}

/// What the coordinator asks the risk gate to admit.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeCandidate {
    pub signal: ValidatedSignal,
    pub requested_stake: f64,
    pub expiration: Duration,
    pub mode: TradeMode,
}

/// An admitted trade. Only the risk gate builds these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub id: Uuid,
    pub instrument: String,
    pub direction: Direction,
    pub stake: f64,
    pub expiration: Duration,
    pub mode: TradeMode,
    pub stake_clamped: bool,
    pub confidence: f64,
    pub price: f64,
}

/// Settled result of a trade. Appended to the trade log, never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub request: TradeRequest,
    pub entry_price: f64,
    pub exit_price: f64,
    pub profit_loss: f64,
    pub is_win: bool,
    pub timestamp: DateTime<Utc>,
}

impl TradeOutcome {
    /// Loss amount as a positive number, zero for wins and flat trades.
    pub fn loss(&self) -> f64 {
        if self.is_win { 0.0 } else { (-self.profit_loss).max(0.0) }
    }
}
