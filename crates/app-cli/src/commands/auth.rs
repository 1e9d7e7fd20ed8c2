//! Authentication commands.

use super::{open_runtime, settle, StatusView};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use app_config_and_utils::{Config, Paths};
use user_init_lifecycle::InitOutcome;

/// Show the signed-in user and initialization status.
pub async fn status(config: &Config, paths: &Paths, format: &OutputFormat) -> Result<()> {
    let runtime = open_runtime(config, paths)?;
    if let Some(user) = runtime.start().await? {
        settle(&runtime, config, &user.id).await;
    }

    output::print(&StatusView::from(runtime.snapshot()), format);
    runtime.shutdown();
    Ok(())
}

/// Sign in with email and a prompted password.
pub async fn sign_in(
    config: &Config,
    paths: &Paths,
    email: &str,
    format: &OutputFormat,
) -> Result<()> {
    let email = email.trim();
    if email.is_empty() {
        output::print_error("Email is required", format);
        return Ok(());
    }

    let runtime = open_runtime(config, paths)?;
    if let Some(user) = runtime.start().await? {
        let shown = user.email.unwrap_or(user.id);
        output::print_success(&format!("Already logged in as {}", shown), format);
        runtime.shutdown();
        return Ok(());
    }

    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        output::print_error("Password is required", format);
        runtime.shutdown();
        return Ok(());
    }

    match runtime.sign_in(email, &password).await {
        Ok(user) => {
            let settled = settle(&runtime, config, &user.id).await;
            let shown = user.email.unwrap_or(user.id);
            output::print_success(&format!("Logged in as {}", shown), format);
            match settled.map(|settled| settled.outcome) {
                Some(InitOutcome::Succeeded) => {}
                Some(InitOutcome::Failed { .. }) => output::print_error(
                    "Account data could not be prepared; run 'parlo init' to retry",
                    format,
                ),
                Some(InitOutcome::Offline) => output::print_error(
                    "Offline; run 'parlo init' when connected",
                    format,
                ),
                None => output::print_error(
                    "Account setup did not finish; run 'parlo init' to check",
                    format,
                ),
            }
        }
        Err(err) => output::print_error(&format!("Login failed: {}", err), format),
    }
    runtime.shutdown();
    Ok(())
}

/// Sign out and wipe local state.
pub async fn sign_out(config: &Config, paths: &Paths, format: &OutputFormat) -> Result<()> {
    let runtime = open_runtime(config, paths)?;
    runtime.start().await?;
    let result = runtime.sign_out().await;
    runtime.shutdown();

    match result {
        Ok(()) => output::print_success("Logged out successfully", format),
        // Local state is gone either way.
        Err(err) => output::print_error(&format!("Logged out locally: {}", err), format),
    }
    Ok(())
}
