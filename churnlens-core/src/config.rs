//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/churnlens/config.toml`, then
//! overridden by environment variables, then by explicit CLI arguments.
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/churnlens/` (~/.config/churnlens/)
//! - Data: `$XDG_DATA_HOME/churnlens/` (~/.local/share/churnlens/)
//! - State/Logs: `$XDG_STATE_HOME/churnlens/` (~/.local/state/churnlens/)

use crate::db::schema::SchemaName;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding the database name.
pub const ENV_DB_NAME: &str = "CHURN_DB";
/// Environment variable overriding the schema name.
pub const ENV_DB_SCHEMA: &str = "CHURN_DB_SCHEMA";
/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "CHURN_DATA_DIR";

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
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Where the event and metric tables live
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Pipeline tuning parameters
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage location configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Database name; becomes a directory under the data dir
    #[serde(default = "default_db_name")]
    pub name: String,

    /// Schema name; becomes `<schema>.db` inside the database directory
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Override for the data directory (defaults to the XDG data dir)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: default_db_name(),
            schema: default_schema(),
            data_dir: None,
        }
    }
}

impl DatabaseConfig {
    /// Directory holding this database's schema files
    pub fn database_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(Config::data_dir)
            .join(&self.name)
    }

    /// Path of the SQLite file backing the configured schema
    pub fn schema_path(&self) -> PathBuf {
        self.database_dir().join(format!("{}.db", self.schema))
    }
}

fn default_db_name() -> String {
    "churn".to_string()
}

fn default_schema() -> String {
    "churn_analytics".to_string()
}

/// Operational parameters for each pipeline run
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Events per account per month an event type must exceed to be "common"
    #[serde(default = "default_min_events_per_month")]
    pub min_events_per_month: f64,

    /// Rows per insert transaction
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Rows read from the CSV per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Trailing window (days) an account needs an event in to be in the dataset
    #[serde(default = "default_active_window_days")]
    pub active_window_days: i64,

    /// Directory for reports and datasets
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_events_per_month: default_min_events_per_month(),
            batch_size: default_batch_size(),
            chunk_size: default_chunk_size(),
            active_window_days: default_active_window_days(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_min_events_per_month() -> f64 {
    0.05
}

fn default_batch_size() -> usize {
    10_000
}

fn default_chunk_size() -> usize {
    100_000
}

fn default_active_window_days() -> i64 {
    90
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path, then apply environment overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Apply environment overrides using the given lookup.
    ///
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = get(ENV_DB_NAME) {
            self.database.name = name;
        }
        if let Some(schema) = get(ENV_DB_SCHEMA) {
            self.database.schema = schema;
        }
        if let Some(dir) = get(ENV_DATA_DIR) {
            self.database.data_dir = Some(PathBuf::from(dir));
        }
    }

    /// Validate configuration, returning the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.database.name.trim().is_empty() {
            return Err(Error::Config("database.name must not be empty".to_string()));
        }
        if self.database.name.contains(|c: char| c == '/' || c == '\\') {
            return Err(Error::Config(
                "database.name must not contain path separators".to_string(),
            ));
        }
        SchemaName::parse(&self.database.schema)?;

        let threshold = self.pipeline.min_events_per_month;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(Error::Config(format!(
                "pipeline.min_events_per_month must be a non-negative number, got {}",
                threshold
            )));
        }
        if self.pipeline.batch_size == 0 {
            return Err(Error::Config(
                "pipeline.batch_size must be at least 1".to_string(),
            ));
        }
        if self.pipeline.chunk_size == 0 {
            return Err(Error::Config(
                "pipeline.chunk_size must be at least 1".to_string(),
            ));
        }
        if self.pipeline.active_window_days < 0 {
            return Err(Error::Config(
                "pipeline.active_window_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/churnlens/config.toml` (~/.config/churnlens/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("churnlens").join("config.toml")
    }

    /// Returns the data directory path (for SQLite databases)
    ///
    /// `$XDG_DATA_HOME/churnlens/` (~/.local/share/churnlens/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("churnlens")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/churnlens/` (~/.local/state/churnlens/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("churnlens")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/churnlens/churnlens.log` (~/.local/state/churnlens/churnlens.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("churnlens.log")
    }

    /// Pin unset XDG variables to their home-relative defaults so every
    /// path helper in the process agrees.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
