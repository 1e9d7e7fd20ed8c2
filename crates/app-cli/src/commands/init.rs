//! Backing-data initialization commands.

use super::{open_runtime, settle};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use app_config_and_utils::{Config, Paths};
use user_init_lifecycle::InitOutcome;

/// Verify the signed-in user's data and initialize it if missing.
///
/// Starting the runtime hands the restored user to the pipeline, which
/// runs the verify/initialize attempt; this waits for its outcome.
pub async fn init(config: &Config, paths: &Paths, format: &OutputFormat) -> Result<()> {
    let runtime = open_runtime(config, paths)?;
    let Some(user) = runtime.start().await? else {
        output::print_error("Not logged in. Run 'parlo sign-in --email <email>' first", format);
        runtime.shutdown();
        return Ok(());
    };

    let settled = settle(&runtime, config, &user.id).await;
    runtime.shutdown();

    match settled.map(|settled| settled.outcome) {
        Some(InitOutcome::Succeeded) => output::print_success("Account data ready", format),
        Some(InitOutcome::Offline) => {
            output::print_error("Offline; try again when connected", format)
        }
        Some(InitOutcome::Failed { error }) => {
            output::print_error(&format!("Initialization failed: {}", error), format)
        }
        None => output::print_error("Initialization did not finish in time", format),
    }
    Ok(())
}

/// Forget the persisted initialization status.
pub async fn reset_init(config: &Config, paths: &Paths, format: &OutputFormat) -> Result<()> {
    let runtime = open_runtime(config, paths)?;
    runtime.reset_init_status().await;
    runtime.shutdown();
    output::print_success("Initialization status reset", format);
    Ok(())
}
