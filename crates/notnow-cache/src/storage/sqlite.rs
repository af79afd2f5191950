//! SQLite cache storage (feature-gated).

use async_trait::async_trait;
use notnow_core::traits::{CacheError, CacheStore};
use sqlx::{Row, SqlitePool};

const MIGRATION_CREATE_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS cache_entries (\
    key TEXT PRIMARY KEY NOT NULL, \
    value TEXT NOT NULL\
)";

/// SQLite storage implementation.
pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    /// Connect to a SQLite database and ensure the cache table exists.
    ///
    /// # Errors
    /// Returns error if database connection or migration fails.
    pub async fn new(database_url: &str) -> Result<Self, CacheError> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| CacheError::Internal(format!("connection failed: {e}")))?;
        Self::from_pool(pool).await
    }

    /// Use an existing pool.
    ///
    /// # Errors
    /// Returns error if the migration fails.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, CacheError> {
        sqlx::query(MIGRATION_CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| CacheError::Internal(format!("migration failed: {e}")))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        let row = sqlx::query("SELECT value FROM cache_entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CacheError::Internal(e.to_string()))?;
        row.map(|r| r.try_get::<String, _>("value"))
            .transpose()
            .map_err(|e| CacheError::Internal(e.to_string()))
    }

    async fn write(&self, key: &str, value: String) -> Result<(), CacheError> {
        sqlx::query(
            "INSERT INTO cache_entries (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::Internal(e.to_string()))?;
        Ok(())
    }
}
