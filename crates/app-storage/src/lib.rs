//! On-device key-value persistence for the Parlo client core.
//!
//! Small JSON blobs (the auth session, the last initialization outcome) are
//! kept behind the [`KeyValueStore`] trait:
//! - [`JsonFileStore`]: one JSON object file, replaced atomically on write
//! - [`MemoryStore`]: process-local map for tests and ephemeral sessions
//!
//! [`LocalStore`] is the cloneable typed handle the rest of the core holds.

mod file;
mod keys;
mod local;
mod memory;
mod traits;

pub use file::JsonFileStore;
pub use keys::StorageKeys;
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use traits::KeyValueStore;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backing file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value is not valid JSON for the requested type
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
