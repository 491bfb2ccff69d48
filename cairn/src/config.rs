//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/cairn/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/cairn/` (~/.config/cairn/)
//! - Data: `$XDG_DATA_HOME/cairn/` (~/.local/share/cairn/)
//! - State/Logs: `$XDG_STATE_HOME/cairn/` (~/.local/state/cairn/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Telemetry pipeline configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Telemetry pipeline configuration
///
/// `server_url` and `public_key` are the parsed endpoint: produced once at
/// configuration time and immutable afterwards. Everything else tunes the
/// capture/delivery pipeline.
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// Collector base URL (e.g., `https://collector.example.com`)
    pub server_url: Option<String>,

    /// Public key credential sent as the `X-Public-Key` header
    pub public_key: Option<String>,

    /// Deployment environment attached to every event
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Application version attached to every event
    pub app_version: Option<String>,

    /// Probability in [0, 1] that a captured event is transmitted
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    /// Maximum breadcrumbs retained for event enrichment
    #[serde(default = "default_max_breadcrumbs")]
    pub max_breadcrumbs: usize,

    /// Enable/disable the persisted offline queue
    #[serde(default = "default_offline_queue_enabled")]
    pub offline_queue_enabled: bool,

    /// Maximum events held in the offline queue
    #[serde(default = "default_max_offline_queue_size")]
    pub max_offline_queue_size: usize,

    /// Seconds between automatic offline queue drains (0 disables the timer)
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Override path for the persisted queue file
    pub queue_path: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            public_key: None,
            environment: default_environment(),
            app_version: None,
            sample_rate: default_sample_rate(),
            max_breadcrumbs: default_max_breadcrumbs(),
            offline_queue_enabled: default_offline_queue_enabled(),
            max_offline_queue_size: default_max_offline_queue_size(),
            flush_interval_secs: default_flush_interval(),
            timeout_secs: default_timeout(),
            queue_path: None,
        }
    }
}

impl TelemetryConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        match &self.server_url {
            None => {
                return Err(Error::Config(
                    "telemetry.server_url is required".to_string(),
                ))
            }
            Some(url) if url.trim().is_empty() => {
                return Err(Error::Config(
                    "telemetry.server_url must not be blank".to_string(),
                ))
            }
            Some(_) => {}
        }
        match &self.public_key {
            None => {
                return Err(Error::Config(
                    "telemetry.public_key is required".to_string(),
                ))
            }
            Some(key) if key.trim().is_empty() => {
                return Err(Error::Config(
                    "telemetry.public_key must not be blank".to_string(),
                ))
            }
            Some(_) => {}
        }
        if !(0.0..=1.0).contains(&self.sample_rate) {
            return Err(Error::Config(
                "telemetry.sample_rate must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.max_breadcrumbs == 0 {
            return Err(Error::Config(
                "telemetry.max_breadcrumbs must be at least 1".to_string(),
            ));
        }
        if self.offline_queue_enabled && self.max_offline_queue_size == 0 {
            return Err(Error::Config(
                "telemetry.max_offline_queue_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The collector base URL with any trailing slash removed.
    ///
    /// Call `validate()` first; returns an error for a missing URL.
    pub fn base_url(&self) -> Result<String> {
        self.server_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or_else(|| Error::Config("telemetry.server_url is required".to_string()))
    }

    /// The persisted queue file path, defaulting to the XDG data dir.
    pub fn queue_file(&self) -> PathBuf {
        self.queue_path
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("offline-queue.json"))
    }
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_sample_rate() -> f64 {
    1.0
}

fn default_max_breadcrumbs() -> usize {
    50
}

fn default_offline_queue_enabled() -> bool {
    true
}

fn default_max_offline_queue_size() -> usize {
    50
}

fn default_flush_interval() -> u64 {
    30
}

fn default_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/cairn/config.toml` (~/.config/cairn/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("cairn").join("config.toml")
    }

    /// Returns the data directory path (for the persisted queue)
    ///
    /// `$XDG_DATA_HOME/cairn/` (~/.local/share/cairn/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("cairn")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/cairn/` (~/.local/state/cairn/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("cairn")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/cairn/cairn.log` (~/.local/state/cairn/cairn.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("cairn.log")
    }
}
