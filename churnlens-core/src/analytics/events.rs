//! Event frequency analysis
//!
//! Frequency of an event kind over a range is
//! `(events / distinct accounts) / elapsed months`. Kinds whose frequency is
//! strictly above a threshold are "common" and get a count metric.

use super::stats::quantile;
use super::{report_file_name, write_csv_rows};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::DateRange;
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

/// Report file for [`events_per_account`].
pub const EVENTS_PER_ACCOUNT_FILE: &str = "events_per_account_per_month.csv";

/// Frequency of one event kind over a date range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventFrequency {
    pub event_type_name: String,
    pub n_event: i64,
    pub n_account: i64,
    pub events_per_account: f64,
    pub n_months: f64,
    pub events_per_account_per_month: f64,
}

impl EventFrequency {
    fn new(event_type_name: String, n_event: i64, n_account: i64, n_months: f64) -> Self {
        let events_per_account = if n_account > 0 {
            n_event as f64 / n_account as f64
        } else {
            0.0
        };
        let events_per_account_per_month = if n_months > 0.0 {
            events_per_account / n_months
        } else {
            0.0
        };
        Self {
            event_type_name,
            n_event,
            n_account,
            events_per_account,
            n_months,
            events_per_account_per_month,
        }
    }
}

/// Frequency table for every event kind seen in the range.
///
/// Ordered by frequency descending, ties broken by name.
pub fn events_per_account(db: &Database, range: &DateRange) -> Result<Vec<EventFrequency>> {
    let months = range.months();
    let mut rows: Vec<EventFrequency> = db
        .event_type_counts(range)?
        .into_iter()
        .map(|c| EventFrequency::new(c.event_type_name, c.n_event, c.n_account, months))
        .collect();

    rows.sort_by(|a, b| {
        b.events_per_account_per_month
            .partial_cmp(&a.events_per_account_per_month)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.event_type_name.cmp(&b.event_type_name))
    });

    tracing::debug!(range = %range, kinds = rows.len(), "Computed event frequencies");
    Ok(rows)
}

/// Names of kinds whose frequency is strictly above `min_events_per_month`, in table order.
pub fn filter_common(frequencies: &[EventFrequency], min_events_per_month: f64) -> Vec<String> {
    frequencies
        .iter()
        .filter(|f| f.n_account > 0 && f.events_per_account_per_month > min_events_per_month)
        .map(|f| f.event_type_name.clone())
        .collect()
}

/// Event kinds frequent enough to warrant a count metric.
pub fn select_common_events(
    db: &Database,
    range: &DateRange,
    min_events_per_month: f64,
) -> Result<Vec<String>> {
    validate_threshold(min_events_per_month)?;
    let frequencies = events_per_account(db, range)?;
    let common = filter_common(&frequencies, min_events_per_month);

    tracing::info!(
        range = %range,
        threshold = min_events_per_month,
        total = frequencies.len(),
        selected = common.len(),
        "Selected common events"
    );
    Ok(common)
}

fn validate_threshold(min_events_per_month: f64) -> Result<()> {
    if !min_events_per_month.is_finite() || min_events_per_month < 0.0 {
        return Err(Error::InvalidInput(format!(
            "minimum events per month must be a non-negative number, got {}",
            min_events_per_month
        )));
    }
    Ok(())
}

/// How many kinds clear a threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdSummary {
    pub threshold: f64,
    pub total: usize,
    pub above: usize,
    pub percent_above: f64,
}

impl ThresholdSummary {
    pub fn new(frequencies: &[EventFrequency], threshold: f64) -> Self {
        let total = frequencies.len();
        let above = filter_common(frequencies, threshold).len();
        let percent_above = if total > 0 {
            above as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            threshold,
            total,
            above,
            percent_above,
        }
    }
}

/// Write the frequency table to `<dir>/events_per_account_per_month.csv`.
pub fn write_events_per_account(dir: &Path, rows: &[EventFrequency]) -> Result<std::path::PathBuf> {
    let path = dir.join(EVENTS_PER_ACCOUNT_FILE);
    write_csv_rows(&path, rows)?;
    Ok(path)
}

// ============================================
// Daily series
// ============================================

/// Events of one kind on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyEventCount {
    pub event_date: NaiveDate,
    pub n_event: i64,
}

/// Daily event counts for one kind, with every day of the range present.
pub fn events_per_day(
    db: &Database,
    event_kind: &str,
    range: &DateRange,
) -> Result<Vec<DailyEventCount>> {
    let kind = db
        .get_event_type(event_kind)?
        .ok_or_else(|| Error::EventKindNotFound(event_kind.to_string()))?;

    let counts: HashMap<String, i64> = db
        .daily_event_counts(kind.id, range)?
        .into_iter()
        .collect();

    Ok(range
        .days()
        .map(|day| DailyEventCount {
            event_date: day,
            n_event: counts
                .get(&day.format("%Y-%m-%d").to_string())
                .copied()
                .unwrap_or(0),
        })
        .collect())
}

/// Write a daily series to `<dir>/<kind>_events_per_day.csv`.
pub fn write_events_per_day(
    dir: &Path,
    event_kind: &str,
    rows: &[DailyEventCount],
) -> Result<std::path::PathBuf> {
    let path = dir.join(report_file_name(event_kind, "_events_per_day.csv"));
    write_csv_rows(&path, rows)?;
    Ok(path)
}

/// Shape of a daily event series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyEventSummary {
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub days: usize,
    pub days_with_events: usize,
    pub zero_days: usize,
    pub longest_zero_run: usize,
    pub total_events: i64,
    pub mean: f64,
    pub median: f64,
    pub min: i64,
    pub max: i64,
    /// Days outside `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`
    pub outlier_days: Vec<NaiveDate>,
}

impl DailyEventSummary {
    /// Summarize a series; `None` when it is empty.
    pub fn from_series(series: &[DailyEventCount]) -> Option<Self> {
        let first = series.first()?;
        let last = series.last()?;

        let mut longest_zero_run = 0;
        let mut run = 0;
        for day in series {
            if day.n_event == 0 {
                run += 1;
                longest_zero_run = longest_zero_run.max(run);
            } else {
                run = 0;
            }
        }

        let mut sorted: Vec<f64> = series.iter().map(|d| d.n_event as f64).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let q1 = quantile(&sorted, 0.25);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        let (low, high) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

        let total_events: i64 = series.iter().map(|d| d.n_event).sum();
        let days_with_events = series.iter().filter(|d| d.n_event > 0).count();

        Some(Self {
            first_day: first.event_date,
            last_day: last.event_date,
            days: series.len(),
            days_with_events,
            zero_days: series.len() - days_with_events,
            longest_zero_run,
            total_events,
            mean: total_events as f64 / series.len() as f64,
            median: quantile(&sorted, 0.5),
            min: series.iter().map(|d| d.n_event).min().unwrap_or(0),
            max: series.iter().map(|d| d.n_event).max().unwrap_or(0),
            outlier_days: series
                .iter()
                .filter(|d| (d.n_event as f64) < low || (d.n_event as f64) > high)
                .map(|d| d.event_date)
                .collect(),
        })
    }
}
