//! Durable record of the last initialization outcome.

use crate::InitializationStatus;
use app_storage::{LocalStore, StorageKeys};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Last known initialization outcome. Each save overwrites the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializationAttemptRecord {
    pub status: InitializationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Epoch millis.
    pub timestamp: i64,
    /// Monotonic per-process stamp; lower stamps arriving late are dropped.
    #[serde(default)]
    pub sequence: u64,
}

impl InitializationAttemptRecord {
    pub fn new(status: InitializationStatus, error: Option<String>, sequence: u64) -> Self {
        Self {
            status,
            error,
            timestamp: chrono::Utc::now().timestamp_millis(),
            sequence,
        }
    }
}

/// Persists [`InitializationAttemptRecord`]s in the local store.
///
/// Writes are applied in sequence order. Storage failures are logged and
/// swallowed; the in-memory status stays authoritative.
pub struct StatusStore {
    store: LocalStore,
    /// Highest sequence written or cleared so far.
    last_applied: Mutex<u64>,
}

impl StatusStore {
    pub fn new(store: LocalStore) -> Self {
        Self {
            store,
            last_applied: Mutex::new(0),
        }
    }

    /// Read the persisted record. `None` when there is no prior record or it
    /// cannot be read.
    pub async fn load(&self) -> Option<InitializationAttemptRecord> {
        match self
            .store
            .get_json::<InitializationAttemptRecord>(StorageKeys::INIT_STATUS)
            .await
        {
            Ok(Some(record)) => {
                let mut last = self.last_applied.lock().await;
                *last = (*last).max(record.sequence);
                Some(record)
            }
            Ok(None) => {
                debug!("No prior initialization record");
                None
            }
            Err(err) => {
                warn!(error = %err, "Failed to read initialization record");
                None
            }
        }
    }

    /// Write `record` unless a newer one was already applied. Returns whether
    /// the write went through.
    pub async fn save(&self, record: &InitializationAttemptRecord) -> bool {
        let mut last = self.last_applied.lock().await;
        if record.sequence <= *last {
            debug!(
                sequence = record.sequence,
                last_applied = *last,
                "Discarding stale initialization record"
            );
            return false;
        }
        *last = record.sequence;

        if let Err(err) = self.store.set_json(StorageKeys::INIT_STATUS, record).await {
            warn!(
                error = %err,
                status = %record.status,
                "Failed to persist initialization record"
            );
            return false;
        }
        debug!(status = %record.status, sequence = record.sequence, "Initialization record saved");
        true
    }

    /// Remove the persisted record, ordered like [`StatusStore::save`].
    pub async fn clear(&self, sequence: u64) -> bool {
        let mut last = self.last_applied.lock().await;
        if sequence <= *last {
            debug!(sequence, last_applied = *last, "Discarding stale clear");
            return false;
        }
        *last = sequence;

        if let Err(err) = self.store.remove(StorageKeys::INIT_STATUS).await {
            warn!(error = %err, "Failed to clear initialization record");
            return false;
        }
        true
    }
}
