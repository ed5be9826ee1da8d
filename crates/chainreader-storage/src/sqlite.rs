//! SQLite bundle store.
//!
//! Persists bundles as BLOBs in a single table. Uses `sqlx` with WAL mode
//! so filter queries can run alongside an active indexer.
//!
//! # Usage
//! ```rust,no_run
//! use chainreader_storage::sqlite::SqliteIndexStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteIndexStore::open("./index.db").await?;
//! let scratch = SqliteIndexStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainreader_core::error::StoreError;
use chainreader_core::store::{validate_key, IndexStore};

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

pub struct SqliteIndexStore {
    pool: SqlitePool,
}

impl SqliteIndexStore {
    /// Open (or create) a database at `path`.
    ///
    /// Accepts a plain file path or a full `sqlite:` URL.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await.map_err(backend)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database. A single connection keeps every query on the
    /// same database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(backend)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS bundles (
                key  TEXT PRIMARY KEY NOT NULL,
                data BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        debug!("sqlite bundle schema initialized");
        Ok(())
    }
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        validate_key(key)?;
        sqlx::query(
            "INSERT INTO bundles (key, data) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET data = excluded.data",
        )
        .bind(key)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let row = sqlx::query("SELECT data FROM bundles WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>("data")))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM bundles WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        // substr avoids LIKE wildcard escaping for '_' and '%'.
        let rows = sqlx::query(
            "SELECT key FROM bundles
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key ASC",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("key")).collect())
    }
}
