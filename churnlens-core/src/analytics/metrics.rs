//! Count metrics derived from events
//!
//! A count metric holds, per account and day, how many events of one kind the
//! account produced that day. The value for day D is stamped at `(D + 1) 00:00`.
//!
//! Stored values are write-once by default: recomputing a day that already
//! has a value leaves it untouched, so late-arriving events do not change
//! history. [`RecomputeMode::Overwrite`] replaces the values in the range
//! instead.

use super::events::select_common_events;
use super::{run_best_effort, BatchResult};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::{count_metric_name, DateRange};
use serde::Serialize;

/// What to do with values already stored for the same (account, metric, time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecomputeMode {
    /// Keep stored values; only fill in missing ones
    #[default]
    KeepExisting,
    /// Delete the metric's values in the range, then recompute
    Overwrite,
}

/// Outcome of computing one metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricRun {
    pub event_kind: String,
    pub metric_name: String,
    pub metric_name_id: i64,
    /// Rows written by this run
    pub rows_inserted: usize,
    /// Rows stored for the metric after this run
    pub total_rows: i64,
}

/// Compute a daily count metric for one event kind over a range.
///
/// Creates the metric definition on first use.
pub fn compute_count_metric(
    db: &Database,
    event_kind: &str,
    metric_name: &str,
    range: &DateRange,
    mode: RecomputeMode,
) -> Result<MetricRun> {
    if metric_name.trim().is_empty() {
        return Err(Error::InvalidInput("metric name must not be empty".to_string()));
    }

    let kind = db
        .get_event_type(event_kind)?
        .ok_or_else(|| Error::EventKindNotFound(event_kind.to_string()))?;

    db.create_metric_tables()?;
    let metric = db.get_or_create_metric_name(metric_name)?;

    let rows_inserted = db.insert_daily_count_metric(
        metric.id,
        kind.id,
        range,
        mode == RecomputeMode::Overwrite,
    )?;
    let total_rows = db.count_metric_values(metric.id)?;

    tracing::info!(
        metric = metric_name,
        event_kind,
        range = %range,
        ?mode,
        rows_inserted,
        total_rows,
        "Computed count metric"
    );

    Ok(MetricRun {
        event_kind: kind.name,
        metric_name: metric.name,
        metric_name_id: metric.id,
        rows_inserted,
        total_rows,
    })
}

/// Compute `count_<kind>` for every common event kind in the range.
///
/// Selection errors abort the call; a failure for one kind is recorded in the
/// result and the remaining kinds still run.
pub fn calculate_metrics_for_common_events(
    db: &Database,
    range: &DateRange,
    min_events_per_month: f64,
    mode: RecomputeMode,
) -> Result<BatchResult<MetricRun>> {
    db.create_metric_tables()?;
    let kinds = select_common_events(db, range, min_events_per_month)?;

    let result = run_best_effort(kinds, |kind| {
        compute_count_metric(db, kind, &count_metric_name(kind), range, mode)
    });

    tracing::info!(
        range = %range,
        succeeded = result.succeeded.len(),
        failed = result.failed.len(),
        "Metric calculation finished"
    );
    Ok(result)
}
