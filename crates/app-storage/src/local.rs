//! Typed handle over a key-value store.

use crate::{KeyValueStore, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Cloneable wrapper that (de)serializes JSON values on top of any
/// [`KeyValueStore`].
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<dyn KeyValueStore>,
}

impl LocalStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    /// Store backed by process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(crate::MemoryStore::new()))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.inner.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StorageResult<()> {
        let raw = serde_json::to_string(value)?;
        self.inner.set(key, &raw).await
    }

    pub async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.get(key).await
    }

    pub async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.inner.set(key, value).await
    }

    pub async fn remove(&self, key: &str) -> StorageResult<bool> {
        self.inner.remove(key).await
    }

    pub async fn multi_get(&self, keys: &[&str]) -> StorageResult<Vec<(String, Option<String>)>> {
        self.inner.multi_get(keys).await
    }

    pub async fn multi_set(&self, entries: HashMap<String, String>) -> StorageResult<()> {
        self.inner.multi_set(entries).await
    }

    /// Wipe everything; used on sign-out and account deletion.
    pub async fn clear(&self) -> StorageResult<()> {
        self.inner.clear().await
    }

    pub async fn keys(&self) -> StorageResult<Vec<String>> {
        self.inner.keys().await
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StorageError, StorageKeys};
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        status: String,
        timestamp: i64,
    }

    #[tokio::test]
    async fn test_json_roundtrip_through_clones() {
        let store = LocalStore::in_memory();
        let clone = store.clone();

        let record = Record {
            status: "success".to_string(),
            timestamp: 1_700_000_000_000,
        };
        store.set_json(StorageKeys::INIT_STATUS, &record).await.unwrap();

        let loaded: Option<Record> = clone.get_json(StorageKeys::INIT_STATUS).await.unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[tokio::test]
    async fn test_get_json_absent_is_none() {
        let store = LocalStore::in_memory();
        let loaded: Option<Record> = store.get_json("missing").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_get_json_wrong_shape_is_encoding_error() {
        let store = LocalStore::in_memory();
        store.set("k", "[1,2,3]").await.unwrap();

        let result: StorageResult<Option<Record>> = store.get_json("k").await;
        assert!(matches!(result, Err(StorageError::Encoding(_))));
    }
}
