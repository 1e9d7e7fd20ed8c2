//! Auth-to-navigation reconciliation.
//!
//! Turns "is the user authenticated" into exactly one reset-style command
//! against a host navigation runtime that may not be mounted yet. Requests
//! are debounced, reconciliations never overlap, and readiness is retried a
//! bounded number of times before giving up with a diagnostic.

mod intent;
mod reconciler;
mod runtime;

pub use intent::{compute_intent, NavigationIntent, RouteNames};
pub use reconciler::{NavigationReconciler, ReconcileOutcome, ReconcilerConfig, ReconcilerStats};
pub use runtime::{HeadlessNavigation, NavigationRuntime, NavigationState};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NavigationError {
    /// The host runtime could not answer or execute a command.
    #[error("Navigation runtime error: {0}")]
    Runtime(String),

    #[error("Reconciler requires a running tokio runtime")]
    NoAsyncRuntime,
}

pub type NavigationResult<T> = Result<T, NavigationError>;
