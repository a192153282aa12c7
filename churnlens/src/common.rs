//! Argument and startup plumbing shared by the churnlens binaries.

#![allow(dead_code)]

use anyhow::{Context, Result};
use churnlens_core::logging::LoggingGuard;
use churnlens_core::{Config, Database, DateRange};
use clap::{Args, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

/// Where the pipeline tables live. Flags override env vars, which override the config file.
#[derive(Args, Debug, Default)]
pub struct DbArgs {
    /// Config file (default: ~/.config/churnlens/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Database name [env: CHURN_DB]
    #[arg(long)]
    pub db_name: Option<String>,

    /// Schema name [env: CHURN_DB_SCHEMA]
    #[arg(long)]
    pub schema: Option<String>,

    /// Data directory holding the databases [env: CHURN_DATA_DIR]
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

/// Inclusive calendar date range.
#[derive(Args, Debug)]
pub struct RangeArgs {
    /// First day of the range (YYYY-MM-DD)
    #[arg(long)]
    pub start_date: String,

    /// Last day of the range, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub end_date: String,
}

impl RangeArgs {
    pub fn range(&self) -> Result<DateRange> {
        DateRange::parse(&self.start_date, &self.end_date).context("invalid date range")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Resolve configuration: CLI flags > environment > config file > defaults.
pub fn load_config(args: &DbArgs) -> Result<Config> {
    Config::ensure_xdg_env();

    let mut config = match &args.config {
        Some(path) => {
            let mut config = Config::load_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
        None => Config::load().context("failed to load configuration")?,
    };

    if let Some(name) = &args.db_name {
        config.database.name = name.clone();
    }
    if let Some(schema) = &args.schema {
        config.database.schema = schema.clone();
    }
    if let Some(dir) = &args.data_dir {
        config.database.data_dir = Some(dir.clone());
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Load configuration and start file logging.
pub fn init(args: &DbArgs) -> Result<(Config, LoggingGuard)> {
    let config = load_config(args)?;
    let guard =
        churnlens_core::logging::init(&config.logging).context("failed to initialize logging")?;
    tracing::debug!(
        log_dir = %guard.log_dir().display(),
        schema = %config.database.schema,
        "Configuration loaded"
    );
    Ok((config, guard))
}

pub fn open_database(config: &Config) -> Result<Database> {
    Database::open(&config.database).with_context(|| {
        format!(
            "failed to open database {} at {}",
            config.database.schema,
            config.database.schema_path().display()
        )
    })
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize output")?
    );
    Ok(())
}
