//! Error types for churnlens-core

use thiserror::Error;

/// Main error type for the churnlens-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Input CSV lacks required columns
    #[error("CSV missing required columns: {missing:?}. Found columns: {found:?}")]
    MissingColumns {
        missing: Vec<String>,
        found: Vec<String>,
    },

    /// Malformed or missing input (dataset files, arguments)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An earlier pipeline stage has not produced the data this stage needs
    #[error("data not available: {0}")]
    DataUnavailable(String),

    /// Event kind not present in the event_type dictionary
    #[error("event type not found: {0}")]
    EventKindNotFound(String),

    /// Metric name not present in the metric_name dictionary
    #[error("metric not found: {0}")]
    MetricNotFound(String),
}

/// Result type alias for churnlens-core
pub type Result<T> = std::result::Result<T, Error>;
