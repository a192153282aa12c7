//! # churnlens-core
//!
//! Core library for churnlens - a batch pipeline that turns account event
//! logs into churn-analysis feature datasets.
//!
//! This library provides:
//! - Domain types for events, metrics and date ranges
//! - Database storage layer with SQLite
//! - CSV ingestion
//! - Analytics stages (common events, metrics, datasets, statistics, QA)
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Pipeline
//!
//! Each stage reads the persisted output of the previous one, so stages can
//! run on different days:
//! - **Load:** event CSV → `event_type` + `event`
//! - **Metrics:** common event kinds → per-account daily `count_<kind>` metrics
//! - **Dataset:** metrics at the latest time → wide per-account table
//! - **Stats:** wide table → per-column summary statistics
//!
//! ## Example
//!
//! ```rust,no_run
//! use churnlens_core::analytics::{calculate_metrics_for_common_events, RecomputeMode};
//! use churnlens_core::{Config, Database, DateRange};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open(&config.database).expect("failed to open database");
//! let range = DateRange::parse("2024-01-01", "2024-03-31").expect("bad range");
//!
//! let result = calculate_metrics_for_common_events(
//!     &db,
//!     &range,
//!     config.pipeline.min_events_per_month,
//!     RecomputeMode::KeepExisting,
//! )
//! .expect("metric calculation failed");
//! println!("{} metrics computed", result.succeeded.len());
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use ingest::{load_csv, LoadOptions, LoadResult};
pub use types::*;

// Public modules
pub mod analytics;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod ingest;
pub mod logging;
pub mod types;
