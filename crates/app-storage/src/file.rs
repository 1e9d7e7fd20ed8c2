//! Single-file JSON store.

use crate::{KeyValueStore, StorageResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

type Entries = BTreeMap<String, String>;

/// Key-value store backed by one JSON object on disk.
///
/// The file is read on first access. Every mutation rewrites the whole file
/// through a sibling temp file and a rename, so readers never observe a
/// partially written document. Mutations are serialized by one async lock.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<Option<Entries>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(path: &Path) -> StorageResult<Entries> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Store file not found, starting empty");
                return Ok(Entries::new());
            }
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_str(&content) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "Store file is corrupt, treating as empty"
                );
                Ok(Entries::new())
            }
        }
    }

    async fn persist(&self, entries: &Entries) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(entries)?;
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Run `f` against the loaded entries while holding the lock.
    async fn with_entries<T>(&self, f: impl FnOnce(&mut Entries) -> T) -> StorageResult<T> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(Self::load(&self.path).await?);
        }
        let entries = guard.get_or_insert_with(Entries::new);
        Ok(f(entries))
    }

    /// Mutate the entries and write them back before releasing the lock.
    /// A failed write leaves the in-memory entries as they were.
    async fn mutate<T>(&self, f: impl FnOnce(&mut Entries) -> T) -> StorageResult<T> {
        let mut guard = self.entries.lock().await;
        let original = match guard.take() {
            Some(entries) => entries,
            None => Self::load(&self.path).await?,
        };
        let mut entries = original.clone();
        let result = f(&mut entries);
        match self.persist(&entries).await {
            Ok(()) => {
                *guard = Some(entries);
                Ok(result)
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Store write failed, keeping previous entries"
                );
                *guard = Some(original);
                Err(err)
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.with_entries(|entries| entries.get(key).cloned()).await
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
        .await
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        self.mutate(|entries| entries.remove(key).is_some()).await
    }

    async fn clear(&self) -> StorageResult<()> {
        self.mutate(|entries| entries.clear()).await
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        self.with_entries(|entries| entries.keys().cloned().collect())
            .await
    }

    async fn multi_set(&self, values: HashMap<String, String>) -> StorageResult<()> {
        self.mutate(|entries| entries.extend(values)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonFileStore::new(&path);
        store.set("auth.session", r#"{"a":1}"#).await.unwrap();
        store.set("init.status", "x").await.unwrap();
        assert!(store.remove("init.status").await.unwrap());

        let reopened = JsonFileStore::new(&path);
        assert_eq!(
            reopened.get("auth.session").await.unwrap(),
            Some(r#"{"a":1}"#.to_string())
        );
        assert_eq!(reopened.get("init.status").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/store.json"));

        assert!(store.keys().await.unwrap().is_empty());
        store.set("k", "v").await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_treated_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert_eq!(store.get("anything").await.unwrap(), None);

        store.set("k", "v").await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: BTreeMap<String, String> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.get("k").map(String::as_str), Some("v"));
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = JsonFileStore::new(&path);
        store.set("k", "v").await.unwrap();

        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_clear_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = JsonFileStore::new(&path);
        store.set("a", "1").await.unwrap();
        store.clear().await.unwrap();

        let reopened = JsonFileStore::new(&path);
        assert!(reopened.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_entries() {
        let dir = tempdir().unwrap();
        let parent = dir.path().join("state");
        let store = JsonFileStore::new(parent.join("store.json"));
        store.set("kept", "1").await.unwrap();

        // Replace the parent directory with a regular file so writes fail.
        std::fs::remove_dir_all(&parent).unwrap();
        std::fs::write(&parent, "blocker").unwrap();

        assert!(store.set("k", "v").await.is_err());
        assert_eq!(store.get("k").await.unwrap(), None);

        assert!(store.remove("kept").await.is_err());
        assert!(store.clear().await.is_err());
        assert_eq!(store.get("kept").await.unwrap(), Some("1".to_string()));
    }
}
