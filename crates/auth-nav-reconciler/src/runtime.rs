//! Host navigation runtime contract.

use crate::{NavigationError, NavigationResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Root navigator state as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationState {
    pub routes: Vec<String>,
    pub index: usize,
}

impl NavigationState {
    pub fn single(route: impl Into<String>) -> Self {
        Self {
            routes: vec![route.into()],
            index: 0,
        }
    }

    pub fn current_route(&self) -> Option<&str> {
        self.routes.get(self.index).map(String::as_str)
    }
}

/// Navigation container owned by the host UI.
pub trait NavigationRuntime: Send + Sync {
    /// Current root state. `Ok(None)` while the container has no state yet.
    fn root_state(&self) -> NavigationResult<Option<NavigationState>>;

    /// Replace the whole stack with `route`.
    fn reset_to(&self, route: &str) -> NavigationResult<()>;
}

/// In-process runtime for the CLI and tests.
#[derive(Debug, Default)]
pub struct HeadlessNavigation {
    state: Mutex<Option<NavigationState>>,
    commands: Mutex<Vec<String>>,
    fail_reads: AtomicBool,
}

impl HeadlessNavigation {
    /// Not mounted: `root_state` reports no state.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mounted_at(route: impl Into<String>) -> Self {
        let runtime = Self::new();
        runtime.mount(route);
        runtime
    }

    pub fn mount(&self, route: impl Into<String>) {
        *self.state.lock() = Some(NavigationState::single(route));
    }

    pub fn unmount(&self) {
        *self.state.lock() = None;
    }

    /// Make `root_state` fail, as a host does while tearing down.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Routes passed to `reset_to`, oldest first.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn current_route(&self) -> Option<String> {
        self.state
            .lock()
            .as_ref()
            .and_then(|state| state.current_route().map(str::to_string))
    }
}

impl NavigationRuntime for HeadlessNavigation {
    fn root_state(&self) -> NavigationResult<Option<NavigationState>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(NavigationError::Runtime("root state unavailable".to_string()));
        }
        Ok(self.state.lock().clone())
    }

    fn reset_to(&self, route: &str) -> NavigationResult<()> {
        let mut state = self.state.lock();
        if state.is_none() {
            return Err(NavigationError::Runtime("navigator not mounted".to_string()));
        }
        *state = Some(NavigationState::single(route));
        self.commands.lock().push(route.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmounted_has_no_state() {
        let runtime = HeadlessNavigation::new();
        assert_eq!(runtime.root_state().unwrap(), None);
        assert!(runtime.reset_to("Main").is_err());
        assert!(runtime.commands().is_empty());
    }

    #[test]
    fn test_reset_replaces_stack() {
        let runtime = HeadlessNavigation::mounted_at("Auth");
        runtime.reset_to("Main").unwrap();
        assert_eq!(runtime.current_route().as_deref(), Some("Main"));
        assert_eq!(runtime.commands(), vec!["Main".to_string()]);
    }

    #[test]
    fn test_failing_reads() {
        let runtime = HeadlessNavigation::mounted_at("Auth");
        runtime.set_fail_reads(true);
        assert!(runtime.root_state().is_err());
    }
}
