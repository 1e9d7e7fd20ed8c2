//! App-facing authentication runtime.
//!
//! [`AppAuthRuntime`] is built once at start and handed to the UI layer. It
//! owns the session observer, the initialization state machine and the
//! navigation reconciler, and runs the ordered pipeline between them.

mod pipeline;
mod runtime;

pub use pipeline::UserSettled;
pub use runtime::{AppAuthRuntime, RuntimeParts, RuntimeSnapshot};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Core(#[from] app_config_and_utils::CoreError),

    #[error(transparent)]
    Auth(#[from] auth_engine::AuthError),

    #[error(transparent)]
    Navigation(#[from] auth_nav_reconciler::NavigationError),

    #[error("Runtime already started")]
    AlreadyStarted,
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
