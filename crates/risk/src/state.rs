use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseReason {
    /// The consecutive-loss breaker tripped after this many losses.
    ConsecutiveLosses(u32),
    Manual,
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConsecutiveLosses(n) => write!(f, "consecutive loss limit reached: {} losses", n),
            Self::Manual => f.write_str("paused by operator"),
        }
    }
}

/// Running risk figures. Only the risk gate writes this; everybody else
/// gets a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub balance: f64,
    pub day_start_balance: f64,
    pub trading_day: NaiveDate,
    pub daily_loss: f64,
    pub trades_today: u32,
    pub consecutive_losses: u32,
    pub paused: bool,
    pub pause_reason: Option<PauseReason>,
    pub real_mode_confirmed: bool,
    pub last_loss_at: Option<DateTime<Utc>>,
}

impl RiskState {
    pub fn new(balance: f64, trading_day: NaiveDate) -> Self {
        Self {
            balance,
            day_start_balance: balance,
            trading_day,
            daily_loss: 0.0,
            trades_today: 0,
            consecutive_losses: 0,
            paused: false,
            pause_reason: None,
            real_mode_confirmed: false,
            last_loss_at: None,
        }
    }
}

/// Monitoring view over [`RiskState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub daily_loss: f64,
    pub daily_loss_percent: f64,
    pub consecutive_losses: u32,
    pub trades_today: u32,
    pub last_loss_at: Option<DateTime<Utc>>,
    pub is_paused: bool,
    pub pause_reason: Option<PauseReason>,
}

impl From<&RiskState> for RiskMetrics {
    fn from(state: &RiskState) -> Self {
        let daily_loss_percent = if state.day_start_balance > 0.0 {
            state.daily_loss / state.day_start_balance * 100.0
        } else {
            0.0
        };
        Self {
            daily_loss: state.daily_loss,
            daily_loss_percent,
            consecutive_losses: state.consecutive_losses,
            trades_today: state.trades_today,
            last_loss_at: state.last_loss_at,
            is_paused: state.paused,
            pause_reason: state.pause_reason,
        }
    }
}
