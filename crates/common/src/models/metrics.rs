use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    pub total_trades: i64,
    pub winning_trades: i64,
    pub losing_trades: i64,
    pub profit_loss: f64,
    pub win_rate: f64,
}

impl DailyMetrics {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            profit_loss: 0.0,
            win_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: i64,
    pub winning_trades: i64,
    pub losing_trades: i64,
    pub win_rate: f64,
    pub total_profit_loss: f64,
    pub average_profit: f64,
    pub average_loss: f64,
    pub max_consecutive_wins: u32,
    pub max_consecutive_losses: u32,
}

/// Win rate in percent, 0 when there were no trades.
pub fn win_rate(wins: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        wins as f64 / total as f64 * 100.0
    }
}
