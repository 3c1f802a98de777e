use std::collections::HashMap;
use std::sync::Arc;

use sqlx::{Sqlite, Transaction};
use tokio::sync::Mutex;

/// Ticker to row id cache for the `instruments` table.
#[derive(Clone, Default)]
pub struct InstrumentManager {
    cache: Arc<Mutex<HashMap<String, i64>>>,
}

impl InstrumentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks the ticker up inside the caller's transaction so a new row is
    /// committed together with whatever references it.
    pub async fn get_or_create_id(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        ticker: &str,
    ) -> Result<i64, sqlx::Error> {
        if let Some(&id) = self.cache.lock().await.get(ticker) {
            return Ok(id);
        }

        let existing =
            sqlx::query_scalar::<_, i64>("SELECT id FROM instruments WHERE ticker = ?")
                .bind(ticker)
                .fetch_optional(&mut **tx)
                .await?;

        let id = match existing {
            Some(id) => id,
            None => {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO instruments(ticker) VALUES (?) RETURNING id",
                )
                .bind(ticker)
                .fetch_one(&mut **tx)
                .await?
            }
        };

        Ok(id)
    }

    /// Records an id once the transaction that produced it has committed.
    pub async fn remember(&self, ticker: &str, id: i64) {
        self.cache.lock().await.insert(ticker.to_string(), id);
    }
}
