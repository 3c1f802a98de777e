use async_trait::async_trait;
use chrono::NaiveDate;
use common::models::{DailyMetrics, TradeOutcome};

use crate::error::StorageError;

/// Append-only trade log with per-day aggregates.
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn append_trade(&self, outcome: &TradeOutcome) -> Result<(), StorageError>;

    async fn read_daily_metrics(&self, date: NaiveDate) -> Result<DailyMetrics, StorageError>;
}
