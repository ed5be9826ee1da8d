//! chainreader-storage — backends for index bundle persistence.
//!
//! Backends:
//! - [`memory`] — in-memory (tests, no persistence)
//! - [`fs`] — one file per bundle under a root directory
//! - [`sqlite`] — SQLite via `sqlx` (single-file persistence)

use std::sync::Arc;

use chainreader_core::config::{IndexConfig, StoreBackend};
use chainreader_core::error::StoreError;
use chainreader_core::store::IndexStore;

pub mod fs;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use fs::FsIndexStore;
pub use memory::MemoryIndexStore;

/// Open the store selected by `config.backend`.
pub async fn open_store(config: &IndexConfig) -> Result<Arc<dyn IndexStore>, StoreError> {
    match config.backend {
        StoreBackend::Fs => Ok(Arc::new(FsIndexStore::open(&config.dir).await?)),
        #[cfg(feature = "sqlite")]
        StoreBackend::Sqlite => {
            let path = config.dir.join("index.db");
            tokio::fs::create_dir_all(&config.dir).await?;
            Ok(Arc::new(sqlite::SqliteIndexStore::open(&path.to_string_lossy()).await?))
        }
        #[cfg(not(feature = "sqlite"))]
        StoreBackend::Sqlite => Err(StoreError::Backend(
            "sqlite backend requires the `sqlite` feature".into(),
        )),
    }
}
