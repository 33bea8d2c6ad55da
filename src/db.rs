use sqlx::sqlite::{SqlitePoolOptions, SqlitePool};
use sqlx::Row;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::Path;

pub async fn init(data_dir: &Path) -> Result<SqlitePool> {
    if !data_dir.exists() {
        std::fs::create_dir_all(data_dir)?;
    }
    let db_path = data_dir.join("cache.db");
    let database_url = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());

    tracing::info!("Connecting to SQLite database: {}", database_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Private in-memory database. A single connection, since every SQLite
/// in-memory connection is its own database.
pub async fn init_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    tracing::debug!("Running migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Raw cache row: payload and the time it was written.
#[derive(Debug, Clone)]
pub struct CacheRow {
    pub key: String,
    pub payload: String,
    pub stored_at: DateTime<Utc>,
}

pub async fn get_cache_entry(pool: &SqlitePool, key: &str) -> Result<Option<CacheRow>> {
    let row = sqlx::query("SELECT key, payload, stored_at FROM cache_entries WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(record) => Ok(Some(CacheRow {
            key: record.try_get("key")?,
            payload: record.try_get("payload")?,
            stored_at: record.try_get("stored_at")?,
        })),
        None => Ok(None),
    }
}

pub async fn put_cache_entry(pool: &SqlitePool, key: &str, payload: &str, stored_at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "INSERT INTO cache_entries (key, payload, stored_at) VALUES ($1, $2, $3)
         ON CONFLICT (key) DO UPDATE SET payload = EXCLUDED.payload, stored_at = EXCLUDED.stored_at"
    )
    .bind(key)
    .bind(payload)
    .bind(stored_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Deletes rows written before `cutoff`. Returns how many were removed.
pub async fn purge_cache_before(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM cache_entries WHERE stored_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// (key, payload size in bytes, stored_at) for every row, newest first.
pub async fn list_cache_entries(pool: &SqlitePool) -> Result<Vec<(String, i64, DateTime<Utc>)>> {
    let rows = sqlx::query(
        "SELECT key, LENGTH(payload) AS size, stored_at FROM cache_entries ORDER BY stored_at DESC"
    )
    .fetch_all(pool)
    .await?;

    let mut result = Vec::new();
    for row in rows {
        let key: String = row.try_get("key")?;
        let size: i64 = row.try_get("size")?;
        let stored_at: DateTime<Utc> = row.try_get("stored_at")?;
        result.push((key, size, stored_at));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_put_get_and_overwrite() {
        let pool = init_memory().await.unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        assert!(get_cache_entry(&pool, "cpi").await.unwrap().is_none());

        put_cache_entry(&pool, "cpi", "{\"a\":1}", t0).await.unwrap();
        put_cache_entry(&pool, "cpi", "{\"a\":2}", t1).await.unwrap();

        let row = get_cache_entry(&pool, "cpi").await.unwrap().unwrap();
        assert_eq!(row.payload, "{\"a\":2}");
        assert_eq!(row.stored_at, t1);
    }

    #[tokio::test]
    async fn test_purge_and_list() {
        let pool = init_memory().await.unwrap();
        let old = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        put_cache_entry(&pool, "old", "x", old).await.unwrap();
        put_cache_entry(&pool, "new", "yy", new).await.unwrap();

        let removed = purge_cache_before(&pool, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()).await.unwrap();
        assert_eq!(removed, 1);

        let rows = list_cache_entries(&pool).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "new");
        assert_eq!(rows[0].1, 2);
    }
}
