//! Parlo CLI - headless access to the client auth core.

mod commands;
mod output;

use app_config_and_utils::{init_logging, Config, Paths};
use clap::{Parser, Subcommand};
use tracing::warn;

/// Parlo CLI - sign in and inspect account initialization.
#[derive(Parser)]
#[command(name = "parlo")]
#[command(about = "Parlo CLI for authentication and account initialization")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the config file
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show login and initialization status
    Status,

    /// Sign in with email and password
    SignIn {
        /// Account email
        #[arg(short, long)]
        email: String,
    },

    /// Sign out and clear local state
    SignOut,

    /// Verify account data and initialize it if missing
    Init,

    /// Reset the stored initialization status
    ResetInit,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let paths = match Paths::new() {
        Ok(paths) => paths,
        Err(e) => {
            output::print_error(&e.to_string(), &cli.format);
            std::process::exit(1);
        }
    };
    let config = Config::load(&paths);
    let log_level = cli.log_level.clone().unwrap_or_else(|| match &config {
        Ok(config) => config.log_level.clone(),
        Err(_) => "warn".to_string(),
    });
    init_logging(&log_level);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Invalid config, using defaults");
            Config::new()
        }
    };

    let result = match &cli.command {
        Commands::Status => commands::status(&config, &paths, &cli.format).await,
        Commands::SignIn { email } => {
            commands::sign_in(&config, &paths, email, &cli.format).await
        }
        Commands::SignOut => commands::sign_out(&config, &paths, &cli.format).await,
        Commands::Init => commands::init(&config, &paths, &cli.format).await,
        Commands::ResetInit => commands::reset_init(&config, &paths, &cli.format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e), &cli.format);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sign_in() {
        let cli = Cli::try_parse_from(["parlo", "sign-in", "--email", "a@b.c", "--format", "json"])
            .unwrap();
        assert!(matches!(cli.format, output::OutputFormat::Json));
        match cli.command {
            Commands::SignIn { email } => assert_eq!(email, "a@b.c"),
            _ => panic!("expected sign-in"),
        }
    }

    #[test]
    fn test_sign_in_requires_email() {
        assert!(Cli::try_parse_from(["parlo", "sign-in"]).is_err());
    }
}
