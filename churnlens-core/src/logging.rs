//! Logging infrastructure for churnlens
//!
//! Each pipeline run appends to `~/.local/state/churnlens/churnlens.log`
//! (XDG state directory), rotated daily. Stage progress is logged at
//! `info`, per-batch detail at `debug`, skipped rows at `warn` and failed
//! batch items at `error`.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const LOG_FILE_NAME: &str = "churnlens.log";

/// Install the global subscriber, writing to the XDG state directory.
///
/// RUST_LOG overrides `config.level`.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    init_in(config, &Config::state_dir())
}

/// Install the global subscriber, writing `churnlens.log` under `log_dir`.
///
/// Fails if a global subscriber is already installed in this process.
pub fn init_in(config: &LoggingConfig, log_dir: &Path) -> Result<LoggingGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install log subscriber: {}", e)))?;

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        _worker: guard,
        log_dir: log_dir.to_path_buf(),
    })
}

/// Logging for tests: writes through the test harness, tolerates repeated calls.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Keeps the background log writer alive; pending lines are flushed on drop.
pub struct LoggingGuard {
    _worker: tracing_appender::non_blocking::WorkerGuard,
    log_dir: PathBuf,
}

impl LoggingGuard {
    /// Directory the rolling log files are written to.
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Path of the (unrotated) log file in the XDG state directory.
pub fn log_file_path() -> PathBuf {
    Config::log_path()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path() {
        let path = log_file_path();
        assert!(path.ends_with(LOG_FILE_NAME));
        assert!(path.parent().unwrap().ends_with("churnlens"));
    }

    #[test]
    fn test_second_subscriber_is_an_error() {
        init_test();
        let dir = tempfile::TempDir::new().unwrap();

        let err = init_in(&LoggingConfig::default(), dir.path())
            .err()
            .expect("a subscriber is already installed");

        assert!(matches!(err, Error::Config(msg) if msg.contains("log subscriber")));
    }
}
