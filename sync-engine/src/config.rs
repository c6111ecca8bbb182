//! Engine configuration.
//!
//! Configuration is loaded from a TOML file or assembled with the builder
//! methods. Secrets are deliberately *not* part of the file: the bearer
//! credential is passed to the engine separately, and the encryption
//! passphrase may be supplied either way.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use sync_core::RetryPolicy;

/// Root configuration for the sync engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the relay, e.g. `https://relay.example`.
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    /// Path to the local SQLite database.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
    /// Encryption passphrase; without it, pushes are refused and pulled
    /// tasks are present-but-unreadable.
    #[serde(default)]
    pub passphrase: Option<String>,
    /// Whether mutations are queued for sync at all.
    #[serde(default = "default_sync_enabled")]
    pub sync_enabled: bool,
    /// Seconds between background sync cycles.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// Page size for pull requests; the engine pages until the relay
    /// reports no further results.
    #[serde(default = "default_pull_page_size")]
    pub pull_page_size: u32,
    /// Retry/backoff settings for relay calls.
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Retry/backoff settings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first failed attempt (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay in milliseconds; doubles per attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap on any single backoff delay, in seconds.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl RetrySettings {
    /// Convert to the pure retry policy from tasksync-core.
    pub fn to_policy(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

// Default value functions
fn default_relay_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("tasksync.db")
}

fn default_sync_enabled() -> bool {
    true
}

fn default_sync_interval_secs() -> u64 {
    60
}

fn default_pull_page_size() -> u32 {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_secs() -> u64 {
    60
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            database: default_database_path(),
            passphrase: None,
            sync_enabled: default_sync_enabled(),
            sync_interval_secs: default_sync_interval_secs(),
            pull_page_size: default_pull_page_size(),
            retry: RetrySettings::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Set the relay base URL.
    pub fn with_relay_url(mut self, url: &str) -> Self {
        self.relay_url = url.to_string();
        self
    }

    /// Set the database path.
    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = path.into();
        self
    }

    /// Set the encryption passphrase.
    pub fn with_passphrase(mut self, passphrase: &str) -> Self {
        self.passphrase = Some(passphrase.to_string());
        self
    }

    /// Set the background sync interval.
    pub fn with_sync_interval_secs(mut self, secs: u64) -> Self {
        self.sync_interval_secs = secs;
        self
    }

    /// Enable or disable queueing mutations for sync.
    pub fn with_sync_enabled(mut self, enabled: bool) -> Self {
        self.sync_enabled = enabled;
        self
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.sync_interval_secs, 60);
        assert_eq!(config.pull_page_size, 100);
        assert!(config.sync_enabled);
        assert!(config.passphrase.is_none());
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
relay_url = "https://relay.example"
database = "/data/tasks.db"
sync_interval_secs = 120

[retry]
max_retries = 5
base_delay_ms = 250
"#;

        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.relay_url, "https://relay.example");
        assert_eq!(config.database, PathBuf::from("/data/tasks.db"));
        assert_eq!(config.sync_interval_secs, 120);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 250);
        // Missing fields fall back to defaults.
        assert_eq!(config.retry.max_delay_secs, 60);
        assert_eq!(config.pull_page_size, 100);
    }

    #[test]
    fn empty_toml_uses_all_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.relay_url, "http://localhost:8080");
        assert!(config.sync_enabled);
    }

    #[test]
    fn retry_settings_convert_to_policy() {
        let settings = RetrySettings {
            max_retries: 4,
            base_delay_ms: 500,
            max_delay_secs: 30,
        };
        let policy = settings.to_policy();
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn builder_methods_chain() {
        let config = EngineConfig::default()
            .with_relay_url("https://r.example")
            .with_passphrase("hunter2")
            .with_sync_interval_secs(30)
            .with_sync_enabled(false);

        assert_eq!(config.relay_url, "https://r.example");
        assert_eq!(config.passphrase.as_deref(), Some("hunter2"));
        assert_eq!(config.sync_interval_secs, 30);
        assert!(!config.sync_enabled);
    }
}
