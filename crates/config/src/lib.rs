//! Configuration loading, validation, and management for Stepwise.
//!
//! Loads configuration from `~/.stepwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Agent variants selectable from configuration.
pub const AGENT_KINDS: &[&str] = &["tool_router", "flowchart", "weather"];

/// The root configuration structure.
///
/// Maps directly to `~/.stepwise/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default model passed to the provider
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Which agent variant to run ("tool_router", "flowchart", "weather")
    #[serde(default = "default_agent")]
    pub agent: String,

    /// Chat history budget
    #[serde(default)]
    pub history: HistoryConfig,

    /// Step engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Query tool settings
    #[serde(default)]
    pub query: QueryConfig,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_agent() -> String {
    "tool_router".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Token budget of the visible history sent to the LLM
    #[serde(default = "default_history_tokens")]
    pub max_tokens: usize,
}

fn default_history_tokens() -> usize {
    3000
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_history_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Wall-clock limit for one policy run
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Capacity of the event stream between a run and its consumer
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
}

fn default_timeout_secs() -> u64 {
    120
}
fn default_stream_capacity() -> usize {
    128
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            stream_capacity: default_stream_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// SQLite database backing the query tool
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Upper bound on rows returned by one query
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

fn default_database_path() -> String {
    AppConfig::config_dir()
        .join("crm.sqlite")
        .to_string_lossy()
        .into_owned()
}
fn default_max_rows() -> usize {
    50
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_rows: default_max_rows(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.stepwise/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `STEPWISE_MODEL`
    /// - `STEPWISE_AGENT`
    /// - `STEPWISE_DATABASE_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("STEPWISE_MODEL") {
            self.default_model = model;
        }
        if let Ok(agent) = std::env::var("STEPWISE_AGENT") {
            self.agent = agent;
        }
        if let Ok(path) = std::env::var("STEPWISE_DATABASE_PATH") {
            self.query.database_path = path;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stepwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !AGENT_KINDS.contains(&self.agent.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "agent must be one of {AGENT_KINDS:?}, got '{}'",
                self.agent
            )));
        }

        if self.history.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "history.max_tokens must be > 0".into(),
            ));
        }

        if self.engine.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "engine.timeout_secs must be > 0".into(),
            ));
        }

        if self.engine.stream_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "engine.stream_capacity must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            default_temperature: default_temperature(),
            agent: default_agent(),
            history: HistoryConfig::default(),
            engine: EngineConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
