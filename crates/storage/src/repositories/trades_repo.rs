use chrono::NaiveDate;
use common::models::{DailyMetrics, PerformanceMetrics, TradeOutcome, metrics::win_rate};
use sqlx::{Sqlite, SqlitePool, Transaction};

pub struct TradesRepository;

impl TradesRepository {
    pub async fn insert(
        tx: &mut Transaction<'_, Sqlite>,
        instrument_id: i64,
        outcome: &TradeOutcome,
    ) -> Result<(), sqlx::Error> {
        let request = &outcome.request;
        sqlx::query(
            r#"
                INSERT INTO trades (
                    trade_id, instrument_id, direction, mode, stake, stake_clamped, confidence,
                    expiration_secs, entry_price, exit_price, profit_loss, is_win, trade_date,
                    timestamp
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id.to_string())
        .bind(instrument_id)
        .bind(request.direction.as_str())
        .bind(request.mode.to_string())
        .bind(request.stake)
        .bind(request.stake_clamped)
        .bind(request.confidence)
        .bind(request.expiration.as_secs() as i64)
        .bind(outcome.entry_price)
        .bind(outcome.exit_price)
        .bind(outcome.profit_loss)
        .bind(outcome.is_win)
        .bind(outcome.timestamp.date_naive())
        .bind(outcome.timestamp)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Folds one outcome into its day's aggregate row.
    pub async fn upsert_daily(
        tx: &mut Transaction<'_, Sqlite>,
        outcome: &TradeOutcome,
    ) -> Result<(), sqlx::Error> {
        let win = i64::from(outcome.is_win);
        sqlx::query(
            r#"
                INSERT INTO daily_performance (
                    date, total_trades, winning_trades, losing_trades, total_profit_loss, win_rate
                ) VALUES (?, 1, ?, ?, ?, ?)
                ON CONFLICT(date) DO UPDATE SET
                    total_trades = total_trades + 1,
                    winning_trades = winning_trades + excluded.winning_trades,
                    losing_trades = losing_trades + excluded.losing_trades,
                    total_profit_loss = total_profit_loss + excluded.total_profit_loss,
                    win_rate = (winning_trades + excluded.winning_trades) * 100.0 / (total_trades + 1),
                    updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(outcome.timestamp.date_naive())
        .bind(win)
        .bind(1 - win)
        .bind(outcome.profit_loss)
        .bind(win as f64 * 100.0)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn daily_metrics(
        pool: &SqlitePool,
        date: NaiveDate,
    ) -> Result<Option<DailyMetrics>, sqlx::Error> {
        let row = sqlx::query_as::<_, (i64, i64, i64, f64, f64)>(
            r#"
                SELECT total_trades, winning_trades, losing_trades, total_profit_loss, win_rate
                FROM daily_performance WHERE date = ?
            "#,
        )
        .bind(date)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(
            |(total_trades, winning_trades, losing_trades, profit_loss, win_rate)| DailyMetrics {
                date,
                total_trades,
                winning_trades,
                losing_trades,
                profit_loss,
                win_rate,
            },
        ))
    }

    /// `(profit_loss, is_win)` of every trade on or after `since`, in the
    /// order they were recorded.
    pub async fn results_since(
        pool: &SqlitePool,
        since: NaiveDate,
    ) -> Result<Vec<(f64, bool)>, sqlx::Error> {
        sqlx::query_as::<_, (f64, bool)>(
            "SELECT profit_loss, is_win FROM trades WHERE trade_date >= ? ORDER BY id",
        )
        .bind(since)
        .fetch_all(pool)
        .await
    }

    /// Deletes trades and daily rows dated before `cutoff`. Returns the
    /// number of trades removed.
    pub async fn delete_before(pool: &SqlitePool, cutoff: NaiveDate) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let trades = sqlx::query("DELETE FROM trades WHERE trade_date < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM daily_performance WHERE date < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(trades)
    }
}

/// Aggregates trade results, oldest first, into performance figures.
pub fn performance_from_results(results: &[(f64, bool)]) -> PerformanceMetrics {
    let mut metrics = PerformanceMetrics::default();
    let mut profit_sum = 0.0;
    let mut loss_sum = 0.0;
    let mut win_streak = 0u32;
    let mut loss_streak = 0u32;

    for &(profit_loss, is_win) in results {
        metrics.total_trades += 1;
        metrics.total_profit_loss += profit_loss;
        if is_win {
            metrics.winning_trades += 1;
            profit_sum += profit_loss;
            win_streak += 1;
            loss_streak = 0;
        } else {
            metrics.losing_trades += 1;
            loss_sum += profit_loss.abs();
            loss_streak += 1;
            win_streak = 0;
        }
        metrics.max_consecutive_wins = metrics.max_consecutive_wins.max(win_streak);
        metrics.max_consecutive_losses = metrics.max_consecutive_losses.max(loss_streak);
    }

    metrics.win_rate = win_rate(metrics.winning_trades, metrics.total_trades);
    if metrics.winning_trades > 0 {
        metrics.average_profit = profit_sum / metrics.winning_trades as f64;
    }
    if metrics.losing_trades > 0 {
        metrics.average_loss = loss_sum / metrics.losing_trades as f64;
    }
    metrics
}
