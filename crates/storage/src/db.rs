use std::path::Path;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use sqlx::sqlite::{self, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::StorageError;

const SCHEMA: &str = include_str!("../../../sql/schema.sql");

/// Opens (creating if needed) the trade log database at `path` and applies
/// the schema.
pub async fn open_pool(path: &str) -> Result<SqlitePool, StorageError> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlite::SqliteSynchronous::Normal)
        .busy_timeout(StdDuration::from_secs(30))
        .statement_cache_capacity(100)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;
    apply_schema(&pool).await?;
    info!("Trade log database ready at {}", path);
    Ok(pool)
}

/// Single-connection in-memory database, mostly for tests and dry runs.
pub async fn open_in_memory() -> Result<SqlitePool, StorageError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    apply_schema(&pool).await?;
    Ok(pool)
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_creates_tables() {
        let pool = open_in_memory().await.unwrap();
        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert!(tables.contains(&"trades".to_string()));
        assert!(tables.contains(&"instruments".to_string()));
        assert!(tables.contains(&"daily_performance".to_string()));
    }

    #[tokio::test]
    async fn schema_is_idempotent() {
        let pool = open_in_memory().await.unwrap();
        apply_schema(&pool).await.unwrap();
    }
}
