//! In-memory bundle store.
//!
//! Useful for tests and short-lived runs that don't need persistence.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use chainreader_core::error::StoreError;
use chainreader_core::store::{validate_key, IndexStore};

/// All data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryIndexStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        validate_key(key)?;
        self.objects.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let objects = self.objects.read().await;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
