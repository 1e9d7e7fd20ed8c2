//! CLI command implementations.

mod auth;
mod init;

pub use auth::{sign_in, sign_out, status};
pub use init::{init, reset_init};

use crate::output;
use anyhow::{Context, Result};
use app_config_and_utils::{Config, Paths};
use app_runtime::{AppAuthRuntime, RuntimeSnapshot, UserSettled};
use auth_nav_reconciler::HeadlessNavigation;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use user_init_lifecycle::InitializationStatus;

/// Build the runtime with a headless navigator standing in for the UI.
pub(crate) fn open_runtime(config: &Config, paths: &Paths) -> Result<AppAuthRuntime> {
    let runtime =
        AppAuthRuntime::from_config(config, paths).context("Failed to build auth runtime")?;
    runtime.attach_navigation(Arc::new(HeadlessNavigation::mounted_at("Auth")));
    runtime.set_navigation_ready(true);
    Ok(runtime)
}

const SETTLE_MARGIN: Duration = Duration::from_secs(2);

/// Wait for the pipeline to finish verify/initialize for `user_id`.
///
/// Verification and initialization are each time-boxed, so two collaborator
/// timeouts bound the wait.
pub(crate) async fn settle(
    runtime: &AppAuthRuntime,
    config: &Config,
    user_id: &str,
) -> Option<UserSettled> {
    let limit = config.collaborator_timeout() * 2 + SETTLE_MARGIN;
    let settled = runtime.wait_until_settled(user_id, limit).await;
    if settled.is_none() {
        debug!(user_id, "Initialization did not settle in time");
    }
    settled
}

/// Status as shown by `parlo status`.
#[derive(Debug, Serialize)]
pub(crate) struct StatusView {
    logged_in: bool,
    user_id: Option<String>,
    email: Option<String>,
    email_verified: Option<bool>,
    init_status: InitializationStatus,
    init_error: Option<String>,
    online: bool,
}

impl From<RuntimeSnapshot> for StatusView {
    fn from(snapshot: RuntimeSnapshot) -> Self {
        Self {
            logged_in: snapshot.user.is_some(),
            user_id: snapshot.user.as_ref().map(|u| u.id.clone()),
            email: snapshot.user.as_ref().and_then(|u| u.email.clone()),
            email_verified: snapshot.user.as_ref().map(|u| u.email_verified),
            init_status: snapshot.initialization.status,
            init_error: snapshot.initialization.error,
            online: snapshot.is_online,
        }
    }
}

impl std::fmt::Display for StatusView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let auth = if self.logged_in { "logged in" } else { "logged out" };
        writeln!(f, "{}", output::row("Auth", auth))?;
        if let Some(user_id) = &self.user_id {
            writeln!(f, "{}", output::row("User", user_id))?;
        }
        if let Some(email) = &self.email {
            let verified = match self.email_verified {
                Some(true) => "",
                _ => " (unverified)",
            };
            writeln!(f, "{}", output::row("Email", &format!("{}{}", email, verified)))?;
        }
        write!(f, "{}", output::row("Initialization", self.init_status.as_str()))?;
        if let Some(error) = &self.init_error {
            write!(f, "\n{}", output::row("Last error", error))?;
        }
        Ok(())
    }
}
