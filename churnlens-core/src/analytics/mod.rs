//! Analytics module for churnlens
//!
//! The pipeline stages, each reading the persisted output of the one before:
//! - [`events`]: event frequency reports and common-event selection
//! - [`metrics`]: per-account daily count metrics
//! - [`dataset`]: the wide per-account feature table at the latest metric time
//! - [`stats`]: per-column summary statistics over a dataset
//! - [`qa`]: metric coverage and metric-over-time reports

pub mod dataset;
pub mod events;
pub mod metrics;
pub mod qa;
pub mod stats;

pub use dataset::{create_current_dataset, CustomerDataset, DatasetRow};
pub use events::{
    events_per_account, events_per_day, select_common_events, DailyEventCount,
    DailyEventSummary, EventFrequency, ThresholdSummary,
};
pub use metrics::{
    calculate_metrics_for_common_events, compute_count_metric, MetricRun, RecomputeMode,
};
pub use qa::{metric_coverage, metric_stats_over_time, MetricCoverage, MetricTimePoint};
pub use stats::{dataset_stats, summarize, summary_path, SummaryReport, SummaryRow};

use crate::error::{Error, Result};
use serde::Serialize;
use std::path::Path;

/// One item that failed inside a best-effort batch.
#[derive(Debug)]
pub struct BatchFailure {
    pub item: String,
    pub error: Error,
}

/// Outcome of a best-effort batch: every item either succeeded or failed.
#[derive(Debug)]
pub struct BatchResult<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchFailure>,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchResult<T> {
    /// True when no item failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of items attempted.
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Run `op` on every item, collecting failures instead of stopping at the first.
///
/// Each failure is logged at error level.
pub fn run_best_effort<I, T, F>(items: I, mut op: F) -> BatchResult<T>
where
    I: IntoIterator<Item = String>,
    F: FnMut(&str) -> Result<T>,
{
    let mut result = BatchResult::default();
    for item in items {
        match op(&item) {
            Ok(value) => result.succeeded.push(value),
            Err(error) => {
                tracing::error!(item = %item, error = %error, "Batch item failed");
                result.failed.push(BatchFailure { item, error });
            }
        }
    }
    result
}

/// File name `<name><suffix>` for a report keyed by a data-derived name.
///
/// Characters other than ASCII alphanumerics, `-`, `_` and `.` become `_`,
/// so the file always lands directly inside the report directory.
pub fn report_file_name(name: &str, suffix: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}", stem, suffix)
}

/// Write serializable rows as a CSV file with a header, creating parent directories.
pub fn write_csv_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    tracing::debug!(path = %path.display(), rows = rows.len(), "Wrote CSV report");
    Ok(())
}
