use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use common::models::{DailyMetrics, PerformanceMetrics, TradeOutcome};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db;
use crate::error::StorageError;
use crate::instrument_manager::InstrumentManager;
use crate::repositories::TradesRepository;
use crate::repositories::trades_repo::performance_from_results;
use crate::traits::TradeStore;

/// SQLite-backed trade log.
pub struct DataManager {
    pool: SqlitePool,
    instruments: InstrumentManager,
}

impl DataManager {
    pub async fn new(database_path: &str) -> Result<Arc<Self>, StorageError> {
        let pool = db::open_pool(database_path).await?;
        Ok(Arc::new(Self::with_pool(pool)))
    }

    pub async fn in_memory() -> Result<Arc<Self>, StorageError> {
        let pool = db::open_in_memory().await?;
        Ok(Arc::new(Self::with_pool(pool)))
    }

    fn with_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            instruments: InstrumentManager::new(),
        }
    }

    /// Win rate, averages and streaks over the last `days` days, today
    /// included.
    pub async fn performance_metrics(&self, days: u32) -> Result<PerformanceMetrics, StorageError> {
        let today = Utc::now().date_naive();
        let since = today
            .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
            .unwrap_or(NaiveDate::MIN);
        self.performance_metrics_since(since).await
    }

    pub async fn performance_metrics_since(
        &self,
        since: NaiveDate,
    ) -> Result<PerformanceMetrics, StorageError> {
        let results = TradesRepository::results_since(&self.pool, since).await?;
        Ok(performance_from_results(&results))
    }

    /// Deletes everything older than `days_to_keep` days. Returns the number
    /// of trades removed.
    pub async fn cleanup_old_data(&self, days_to_keep: u32) -> Result<u64, StorageError> {
        let today = Utc::now().date_naive();
        let cutoff = today
            .checked_sub_days(Days::new(u64::from(days_to_keep)))
            .unwrap_or(NaiveDate::MIN);
        self.cleanup_before(cutoff).await
    }

    pub async fn cleanup_before(&self, cutoff: NaiveDate) -> Result<u64, StorageError> {
        let removed = TradesRepository::delete_before(&self.pool, cutoff).await?;
        info!("Removed {} trades dated before {}", removed, cutoff);
        Ok(removed)
    }
}

#[async_trait]
impl TradeStore for DataManager {
    async fn append_trade(&self, outcome: &TradeOutcome) -> Result<(), StorageError> {
        let ticker = outcome.request.instrument.as_str();
        let mut tx = self.pool.begin().await?;

        let instrument_id = self.instruments.get_or_create_id(&mut tx, ticker).await?;
        TradesRepository::insert(&mut tx, instrument_id, outcome).await?;
        TradesRepository::upsert_daily(&mut tx, outcome).await?;
        tx.commit().await?;

        self.instruments.remember(ticker, instrument_id).await;
        debug!(
            "Logged trade {} on {} (P/L {:+.2})",
            outcome.request.id, ticker, outcome.profit_loss
        );
        Ok(())
    }

    async fn read_daily_metrics(&self, date: NaiveDate) -> Result<DailyMetrics, StorageError> {
        Ok(TradesRepository::daily_metrics(&self.pool, date)
            .await?
            .unwrap_or_else(|| DailyMetrics::empty(date)))
    }
}
