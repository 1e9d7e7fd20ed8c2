//! Configuration management for the client core.

use crate::{CoreError, CoreResult, Paths, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default Supabase URL (can be overridden at compile time via SUPABASE_URL env var).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SUPABASE_URL") {
    Some(url) => url,
    None => "https://parlo-dev.supabase.co",
};

/// Default Supabase publishable key (can be overridden at compile time via SUPABASE_PUBLISHABLE_KEY env var).
pub const DEFAULT_SUPABASE_PUBLISHABLE_KEY: &str = match option_env!("SUPABASE_PUBLISHABLE_KEY") {
    Some(key) => key,
    None => "dev-publishable-key",
};

/// Default tutoring API base URL.
pub const DEFAULT_TUTOR_API_URL: &str = "https://tutor.parlo.app/api/v1";

/// Default RevenueCat public key (compile time via REVENUECAT_API_KEY).
const DEFAULT_REVENUECAT_API_KEY: Option<&str> = option_env!("REVENUECAT_API_KEY");

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_NAVIGATION_DEBOUNCE_MS: u64 = 100;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Supabase project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Supabase publishable API key (public, safe to expose).
    #[serde(default = "default_supabase_publishable_key")]
    pub supabase_publishable_key: String,
    /// Tutoring API base URL.
    #[serde(default = "default_tutor_api_url")]
    pub tutor_api_url: String,
    /// RevenueCat API key (optional; billing is disabled without it).
    #[serde(default = "default_revenuecat_api_key")]
    pub revenuecat_api_key: Option<String>,
    /// Reported in diagnostics device snapshots.
    #[serde(default = "default_app_version")]
    pub app_version: String,
    /// Client-side time box for backing-data verification/initialization calls.
    #[serde(default = "default_collaborator_timeout_ms")]
    pub collaborator_timeout_ms: u64,
    /// Window in which navigation requests are collapsed.
    #[serde(default = "default_navigation_debounce_ms")]
    pub navigation_debounce_ms: u64,
    /// Retry policy while the navigation container is not mounted.
    #[serde(default = "RetryPolicy::navigation_readiness")]
    pub navigation_retry: RetryPolicy,
    /// Ship diagnostic events to the backend (log-only when false).
    #[serde(default = "default_true")]
    pub diagnostics_enabled: bool,
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_publishable_key() -> String {
    DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string()
}

fn default_tutor_api_url() -> String {
    DEFAULT_TUTOR_API_URL.to_string()
}

fn default_revenuecat_api_key() -> Option<String> {
    DEFAULT_REVENUECAT_API_KEY.map(|s| s.to_string())
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_collaborator_timeout_ms() -> u64 {
    DEFAULT_COLLABORATOR_TIMEOUT_MS
}

fn default_navigation_debounce_ms() -> u64 {
    DEFAULT_NAVIGATION_DEBOUNCE_MS
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            supabase_url: default_supabase_url(),
            supabase_publishable_key: default_supabase_publishable_key(),
            tutor_api_url: default_tutor_api_url(),
            revenuecat_api_key: default_revenuecat_api_key(),
            app_version: default_app_version(),
            collaborator_timeout_ms: DEFAULT_COLLABORATOR_TIMEOUT_MS,
            navigation_debounce_ms: DEFAULT_NAVIGATION_DEBOUNCE_MS,
            navigation_retry: RetryPolicy::navigation_readiness(),
            diagnostics_enabled: true,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from a file, falling back to defaults.
    ///
    /// The Supabase URL and key are compile-time only and always use the
    /// built-in values, regardless of the file contents.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.supabase_url = default_supabase_url();
        config.supabase_publishable_key = default_supabase_publishable_key();

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("PARLO_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(url) = std::env::var("PARLO_TUTOR_API_URL") {
            if !url.trim().is_empty() {
                self.tutor_api_url = url.trim().to_string();
            }
        }
    }

    fn validate(&self) -> CoreResult<()> {
        if self.collaborator_timeout_ms == 0 {
            return Err(CoreError::InvalidSetting {
                key: "collaborator_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        self.tutor_api_url()?;
        Ok(())
    }

    /// Get the Supabase URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }

    /// Get the tutoring API URL as a parsed URL.
    pub fn tutor_api_url(&self) -> CoreResult<Url> {
        Url::parse(&self.tutor_api_url).map_err(CoreError::from)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    pub fn navigation_debounce(&self) -> Duration {
        Duration::from_millis(self.navigation_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Backoff;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.supabase_url, DEFAULT_SUPABASE_URL);
        assert_eq!(config.collaborator_timeout(), Duration::from_secs(15));
        assert_eq!(config.navigation_debounce(), Duration::from_millis(100));
        assert_eq!(config.navigation_retry.backoff, Backoff::Linear);
        assert!(config.diagnostics_enabled);
    }

    #[test]
    fn test_config_load_from_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(&config_path, r#"{ "log_level": "debug" }"#).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.navigation_debounce_ms, 100);
        assert_eq!(config.navigation_retry, RetryPolicy::navigation_readiness());
        assert_eq!(config.tutor_api_url, DEFAULT_TUTOR_API_URL);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.navigation_debounce_ms = 250;
        config.supabase_url = "https://elsewhere.supabase.co".to_string();

        config.save(&paths).unwrap();

        let loaded = Config::load(&paths).unwrap();
        assert_eq!(loaded.navigation_debounce_ms, 250);
        // Compile-time values win over the file.
        assert_eq!(loaded.supabase_url, DEFAULT_SUPABASE_URL);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.supabase_url, DEFAULT_SUPABASE_URL);
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let mut config = Config::default();
        config.collaborator_timeout_ms = 0;
        config.save(&paths).unwrap();

        assert!(matches!(
            Config::load(&paths),
            Err(CoreError::InvalidSetting {
                key: "collaborator_timeout_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_config_supabase_url_parse() {
        let config = Config::default();
        let url = config.supabase_url().unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_config_invalid_url() {
        let mut config = Config::default();
        config.tutor_api_url = "not a valid url".to_string();

        assert!(config.tutor_api_url().is_err());
    }
}
