//! Object-store abstraction used to persist index bundles.
//!
//! Keys are `/`-separated relative paths such as
//! `messagetype/10000/0000010000`. Backends live in `chainreader-storage`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;

#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Write `data` under `key`, replacing any previous value.
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    /// All keys starting with `prefix`, in lexical order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl<T: IndexStore + ?Sized> IndexStore for Arc<T> {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        (**self).put(key, data).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        (**self).exists(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).list(prefix).await
    }
}

/// Rejects keys that are empty, absolute, or escape the store root.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if bad {
        return Err(StoreError::Backend(format!("invalid key '{key}'")));
    }
    Ok(())
}
