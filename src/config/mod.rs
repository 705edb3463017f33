//! Configuration Module
//!
//! Handles application configuration loading, validation, and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend API connection
    #[serde(default)]
    pub api: ApiConfig,

    /// Session status polling
    #[serde(default)]
    pub polling: PollingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend API configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the backend REST API (default: "http://localhost:3000/api")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Per-request timeout in seconds (default: 15)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// Keeps the token out of logs and `config` output
impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Session polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between status checks in milliseconds (default: 2500)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Give up on a session after this many seconds; 0 disables (default: 300)
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,

    /// QR fetch attempts while the backend is still generating (default: 5)
    #[serde(default = "default_qr_retry_attempts")]
    pub qr_retry_attempts: u32,

    /// Delay between QR fetch attempts in milliseconds (default: 1500)
    #[serde(default = "default_qr_retry_delay_ms")]
    pub qr_retry_delay_ms: u64,
}

fn default_interval_ms() -> u64 {
    2500
}

fn default_max_duration_secs() -> u64 {
    300
}

fn default_qr_retry_attempts() -> u32 {
    5
}

fn default_qr_retry_delay_ms() -> u64 {
    1500
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_duration_secs: default_max_duration_secs(),
            qr_retry_attempts: default_qr_retry_attempts(),
            qr_retry_delay_ms: default_qr_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log to file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Base directory for local state: ~/.wasuite
pub fn wasuite_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wasuite")
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Priority (lowest to highest):
    /// 1. Default values
    /// 2. System config: ~/.config/wasuite/config.toml
    /// 3. Local config: ./wasuite.toml
    /// 4. Environment variables
    pub fn load() -> Result<Self> {
        tracing::debug!("Loading configuration...");

        let mut config = Self::default();

        if let Some(system_config_path) = Self::system_config_path()
            && system_config_path.exists()
        {
            tracing::debug!("Loading system config from: {:?}", system_config_path);
            config = Self::merge_from_file(&system_config_path)?;
        }

        let local_config_path = Self::local_config_path();
        if local_config_path.exists() {
            tracing::debug!("Loading local config from: {:?}", local_config_path);
            config = Self::merge_from_file(&local_config_path)?;
        }

        config.apply_env_overrides();

        tracing::debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply environment
    /// overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading configuration from custom path: {:?}", path);

        if !path.exists() {
            anyhow::bail!("Config file not found: {:?}", path);
        }
        let mut config = Self::merge_from_file(path)?;
        config.apply_env_overrides();

        tracing::debug!("Configuration loaded successfully from custom path");
        Ok(config)
    }

    /// Get the system config path: ~/.config/wasuite/config.toml
    pub fn system_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("wasuite").join("config.toml"))
    }

    /// Get the local config path: ./wasuite.toml
    fn local_config_path() -> PathBuf {
        PathBuf::from("./wasuite.toml")
    }

    /// Later files replace earlier ones wholesale; missing sections fall
    /// back to defaults.
    fn merge_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a variable lookup
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("WASUITE_API_URL") {
            self.api.base_url = url;
        }

        if let Some(token) = lookup("WASUITE_API_TOKEN") {
            self.api.token = Some(token);
        }

        if let Some(level) = lookup("WASUITE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(file) = lookup("WASUITE_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }

        if let Some(interval) = lookup("WASUITE_POLL_INTERVAL_MS") {
            match interval.parse() {
                Ok(ms) => self.polling.interval_ms = ms,
                Err(_) => tracing::warn!("Ignoring invalid WASUITE_POLL_INTERVAL_MS: {}", interval),
            }
        }

        if let Some(max) = lookup("WASUITE_POLL_MAX_SECS") {
            match max.parse() {
                Ok(secs) => self.polling.max_duration_secs = secs,
                Err(_) => tracing::warn!("Ignoring invalid WASUITE_POLL_MAX_SECS: {}", max),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        tracing::debug!("Validating configuration...");

        let base_url = self.api.base_url.trim();
        if base_url.is_empty() {
            anyhow::bail!("api.base_url is empty");
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            anyhow::bail!(
                "api.base_url must start with http:// or https:// (got {})",
                base_url
            );
        }
        if self.api.timeout_secs == 0 {
            anyhow::bail!("api.timeout_secs must be greater than 0");
        }

        if self.polling.interval_ms == 0 {
            anyhow::bail!("polling.interval_ms must be greater than 0");
        }
        if self.polling.qr_retry_attempts == 0 {
            anyhow::bail!("polling.qr_retry_attempts must be at least 1");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        fs::write(path, toml_string)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        tracing::info!("Configuration saved to: {:?}", path);
        Ok(())
    }
}
