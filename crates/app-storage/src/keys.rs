//! Storage key constants.

/// Keys the core writes into the local store.
pub struct StorageKeys;

impl StorageKeys {
    /// Persisted identity-provider session (JSON)
    pub const AUTH_SESSION: &'static str = "auth.session";

    /// Last initialization attempt record (JSON)
    pub const INIT_STATUS: &'static str = "init.status";
}
