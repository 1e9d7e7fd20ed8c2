//! Key-value store trait definition.

use crate::StorageResult;
use async_trait::async_trait;
use std::collections::HashMap;

/// Async key-value store holding string values.
///
/// Every call is a suspension point; implementations must be safe to share
/// across tasks.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a value. Returns `None` if the key doesn't exist.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove a value. Returns `true` if the key existed.
    async fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Remove every key.
    async fn clear(&self) -> StorageResult<()>;

    /// All keys currently stored, in no particular order.
    async fn keys(&self) -> StorageResult<Vec<String>>;

    /// Get several values at once, preserving the order of `keys`.
    async fn multi_get(&self, keys: &[&str]) -> StorageResult<Vec<(String, Option<String>)>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push((key.to_string(), self.get(key).await?));
        }
        Ok(out)
    }

    /// Store several values at once.
    async fn multi_set(&self, entries: HashMap<String, String>) -> StorageResult<()> {
        for (key, value) in &entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    /// Check if a key exists.
    async fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
