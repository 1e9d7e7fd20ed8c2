//! User initialization lifecycle.
//!
//! After sign-in or a cold start, [`InitStateMachine`] decides whether the
//! authenticated user has durable backing data, (re)creates it when it is
//! missing, and records the outcome:
//!
//! ```text
//! unknown ─► in_progress ─► success | failed | requires_retry
//! ```
//!
//! Failures never propagate to callers; they become status values and
//! diagnostic events.

mod collaborators;
mod init_fsm;
mod machine;
mod status_store;

pub use collaborators::{BackingDataInitializer, BackingDataVerifier, SupabaseBackingData};
pub use init_fsm::{InitMachine, InitMachineInput, InitMachineState, InitializationStatus};
pub use machine::{InitOutcome, InitSnapshot, InitStateMachine};
pub use status_store::{InitializationAttemptRecord, StatusStore};

use thiserror::Error;

/// Failure reported by a backing-data collaborator.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    /// No signed-in user to act for
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Auth error: {0}")]
    Auth(#[from] auth_engine::AuthError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend rejected request: {status} ({body_summary})")]
    Rejected { status: u16, body_summary: String },

    /// The call did not finish within the collaborator time box
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("{0}")]
    Other(String),
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;
