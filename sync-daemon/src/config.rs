//! Configuration loading for sync-daemon.
//!
//! Configuration is loaded from a TOML file (default: `sync.toml`).
//! The API key, organization id and URL can also come from the environment;
//! see the binary's `--help`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sync_client::HttpSourceConfig;

use crate::engine::EngineConfig;

/// Root configuration for sync-daemon.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Streaming API configuration.
    #[serde(default)]
    pub api: ApiConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Synchronization configuration.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Streaming API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the API.
    #[serde(default = "default_api_url")]
    pub url: String,
    /// API key (required).
    #[serde(default)]
    pub key: Option<String>,
    /// Organization to synchronize (required).
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Connect timeout in seconds (default: 5).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Synchronization configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Maximum measurements per transaction (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Track gaps and backfill them through replay (default: false).
    #[serde(default)]
    pub replay_enabled: bool,
    /// Seconds between ticks (default: 10).
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Upper bound for the backoff sleep in seconds (default: 600).
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Runtime worker threads; live and replay need one each (default: 3).
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

// Default value functions
fn default_api_url() -> String {
    sync_client::DEFAULT_API_URL.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_database_path() -> PathBuf {
    PathBuf::from("measurements.db")
}

fn default_batch_size() -> usize {
    1000
}

fn default_tick_interval_secs() -> u64 {
    10
}

fn default_max_backoff_secs() -> u64 {
    10 * 60
}

fn default_worker_threads() -> usize {
    3
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            key: None,
            organization_id: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            replay_enabled: false,
            tick_interval_secs: default_tick_interval_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            worker_threads: default_worker_threads(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Check that the configuration can be run.
    ///
    /// All missing required properties are reported together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.api.key.as_deref().map_or(true, str::is_empty) {
            problems.push("missing api.key".to_string());
        }
        if self
            .api
            .organization_id
            .as_deref()
            .map_or(true, str::is_empty)
        {
            problems.push("missing api.organization_id".to_string());
        }
        if let Err(e) = reqwest::Url::parse(&self.api.url) {
            problems.push(format!("api.url {:?} is not a valid URL: {}", self.api.url, e));
        }
        if self.sync.batch_size == 0 {
            problems.push("sync.batch_size must be at least 1".to_string());
        }
        if self.sync.worker_threads < 2 {
            problems.push("sync.worker_threads must be at least 2".to_string());
        }
        if self.sync.tick_interval_secs == 0 {
            problems.push("sync.tick_interval_secs must be at least 1".to_string());
        }
        if self.sync.max_backoff_secs < self.sync.tick_interval_secs {
            problems.push("sync.max_backoff_secs must not be below sync.tick_interval_secs".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }

    /// Settings for [`sync_client::HttpSource`].
    pub fn source_config(&self) -> HttpSourceConfig {
        HttpSourceConfig {
            base_url: self.api.url.clone(),
            organization_id: self.api.organization_id.clone().unwrap_or_default(),
            api_key: self.api.key.clone().unwrap_or_default(),
            connect_timeout: Duration::from_secs(self.api.connect_timeout_secs),
        }
    }

    /// Settings for [`crate::engine::SyncEngine`].
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            batch_size: self.sync.batch_size,
            replay_enabled: self.sync.replay_enabled,
        }
    }

    /// Base tick interval.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.sync.tick_interval_secs)
    }

    /// Backoff cap.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.sync.max_backoff_secs)
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
    /// The configuration is incomplete or inconsistent.
    #[error("invalid configuration: {}", problems.join(", "))]
    Invalid {
        /// Every problem found.
        problems: Vec<String>,
    },
}
