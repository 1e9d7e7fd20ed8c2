//! # Observability
//!
//! Centralized logging layer for the Parlo client core.
//!
//! ## Design Philosophy
//!
//! Crates are **log producers**. They use standard `tracing` macros and never
//! decide where logs go. The host (mobile shell, CLI, test harness) calls
//! `observability::init_with_config()` once at startup.
//!
//! Two outputs are supported:
//!
//! - A JSONL file (`~/.parlo/logs/app.jsonl` by default) with one structured
//!   entry per line. Sensitive fields are redacted before they are written.
//! - A compact human-readable stderr stream.
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "parlo-cli".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!("ready");
//! ```

mod file;
mod json_layer;
pub mod redact;

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use file::LogFileWriter;
pub use json_layer::{JsonLayer, LogEntry};

/// Output destination for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSink {
    /// JSONL file plus optional stderr.
    File,
    /// Stderr only (no file is opened).
    StderrOnly,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::File
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the emitting component (e.g., "parlo-app", "parlo-cli").
    /// Included in every JSONL line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.parlo/logs/app.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,

    /// Where structured output goes.
    pub sink: LogSink,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            sink: LogSink::File,
        }
    }
}

/// Initialize the observability layer with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the observability layer with custom configuration.
///
/// Returns `false` when a global subscriber was already installed (for
/// example by a test harness). A log file that cannot be opened downgrades
/// to stderr output instead of failing.
pub fn init_with_config(config: LogConfig) -> bool {
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let log_path = config.log_path.clone().or_else(default_log_path);
    let file_writer = match (config.sink, log_path.as_ref()) {
        (LogSink::File, Some(path)) => match LogFileWriter::new(path) {
            Ok(writer) => Some(writer),
            Err(err) => {
                eprintln!("observability: cannot open {}: {}", path.display(), err);
                None
            }
        },
        _ => None,
    };
    let stderr_enabled = config.also_stderr || file_writer.is_none();

    let json_layer = file_writer.map(|writer| {
        JsonLayer::new(config.service_name.clone(), writer).with_filter(env_filter())
    });

    let stderr_layer = stderr_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter())
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            service = %config.service_name,
            log_path = ?log_path,
            "observability initialized"
        );
    }
    installed
}

/// Central log file location.
fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".parlo").join("logs").join("app.jsonl"))
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
        assert_eq!(config.sink, LogSink::File);
    }

    #[test]
    fn test_default_log_path_under_parlo_dir() {
        if let Some(path) = default_log_path() {
            assert!(path.ends_with(".parlo/logs/app.jsonl"));
        }
    }

    #[test]
    fn test_second_init_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            service_name: "test".into(),
            log_path: Some(dir.path().join("app.jsonl")),
            ..Default::default()
        };

        // Whichever call wins, the other must not panic.
        let first = init_with_config(config.clone());
        let second = init_with_config(config);
        assert!(!(first && second));
    }
}
