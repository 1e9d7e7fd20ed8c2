//! Connectivity signal injected by the host platform.
//!
//! The host pushes reachability changes into a [`ConnectivitySignal`]; core
//! components read it through the [`ConnectivityProbe`] trait so tests can
//! substitute a fixed value.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Point-in-time network description attached to diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub is_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
}

/// Read-only view of current connectivity.
pub trait ConnectivityProbe: Send + Sync {
    /// Returns true when the device believes it can reach the network.
    fn is_online(&self) -> bool;

    /// Transport in use ("wifi", "cellular", ...), when known.
    fn connection_type(&self) -> Option<String> {
        None
    }

    fn snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            is_online: self.is_online(),
            connection_type: self.connection_type(),
        }
    }
}

/// Host-driven connectivity state.
#[derive(Debug)]
pub struct ConnectivitySignal {
    online: watch::Sender<bool>,
    connection_type: Mutex<Option<String>>,
}

impl ConnectivitySignal {
    pub fn new(online: bool) -> Self {
        let (online, _) = watch::channel(online);
        Self {
            online,
            connection_type: Mutex::new(None),
        }
    }

    /// Record a reachability change reported by the platform.
    pub fn set_online(&self, online: bool, connection_type: Option<String>) {
        *self.connection_type.lock() = connection_type;
        self.online.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                tracing::debug!(online, "Connectivity changed");
                *current = online;
                true
            }
        });
    }

    /// Receiver that wakes on every reachability change.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityProbe for ConnectivitySignal {
    fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    fn connection_type(&self) -> Option<String> {
        self.connection_type.lock().clone()
    }
}
