// Persistent key-value slot for the match log archive (SQLite via sqlx).

use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::archive::{MatchLogEntry, STORAGE_KEY};
use crate::error::StorageError;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ── Key-value slot ───────────────────────────────────────────────

    pub async fn get_value(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn put_value(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get_value(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.put_value(key, &raw).await?;
        Ok(())
    }

    // ── Match logs ───────────────────────────────────────────────────

    /// Every stored log entry, most recent first. An unset slot is an empty archive.
    pub async fn read_logs(&self) -> Result<Vec<MatchLogEntry>, StorageError> {
        Ok(self.get_json(STORAGE_KEY).await?.unwrap_or_default())
    }

    /// Replace the stored archive.
    pub async fn write_logs(&self, entries: &[MatchLogEntry]) -> Result<(), StorageError> {
        self.put_json(STORAGE_KEY, entries).await
    }

    /// Prepend one entry to the stored archive.
    pub async fn append_log(&self, entry: &MatchLogEntry) -> Result<(), StorageError> {
        let mut entries = self.read_logs().await?;
        entries.insert(0, entry.clone());
        self.write_logs(&entries).await
    }
}
