//! Metric quality checks
//!
//! Coverage tells how many of the accounts active in a range received each
//! metric; the over-time series shows whether a metric was computed for
//! every day and how its distribution moves.

use super::{report_file_name, write_csv_rows};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::{parse_db_timestamp, DateRange};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Report file for [`metric_coverage`].
pub const METRIC_COVERAGE_FILE: &str = "metric_coverage.csv";

/// How widely one metric was computed over a range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricCoverage {
    pub metric_name: String,
    /// Accounts with at least one value of this metric
    pub count_with_metric: i64,
    /// Accounts with at least one event in the range
    pub n_account: i64,
    pub pct_coverage: f64,
    pub avg_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub earliest_metric: NaiveDateTime,
    pub last_metric: NaiveDateTime,
}

/// Coverage of every metric with values produced from `range`.
pub fn metric_coverage(db: &Database, range: &DateRange) -> Result<Vec<MetricCoverage>> {
    let n_account = db.count_accounts_in_range(range)?;
    let (first, last) = range.metric_time_bounds();

    let mut rows = Vec::new();
    for (metric_name, count_with_metric, avg, min, max, earliest, latest) in
        db.metric_coverage_rows(&first, &last)?
    {
        rows.push(MetricCoverage {
            metric_name,
            count_with_metric,
            n_account,
            pct_coverage: if n_account > 0 {
                count_with_metric as f64 / n_account as f64 * 100.0
            } else {
                0.0
            },
            avg_value: avg,
            min_value: min,
            max_value: max,
            earliest_metric: parse_db_timestamp(&earliest)?,
            last_metric: parse_db_timestamp(&latest)?,
        });
    }

    tracing::info!(range = %range, metrics = rows.len(), n_account, "Computed metric coverage");
    Ok(rows)
}

/// Write coverage to `<dir>/metric_coverage.csv`.
pub fn write_metric_coverage(dir: &Path, rows: &[MetricCoverage]) -> Result<PathBuf> {
    let path = dir.join(METRIC_COVERAGE_FILE);
    write_csv_rows(&path, rows)?;
    Ok(path)
}

/// Distribution of one metric at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTimePoint {
    pub metric_time: NaiveDateTime,
    pub avg: f64,
    pub n_calc: i64,
    pub min: f64,
    pub max: f64,
}

/// Per-timestamp aggregates of a metric across accounts.
pub fn metric_stats_over_time(
    db: &Database,
    metric_name: &str,
    range: &DateRange,
) -> Result<Vec<MetricTimePoint>> {
    let metric = db
        .get_metric_name(metric_name)?
        .ok_or_else(|| Error::MetricNotFound(metric_name.to_string()))?;
    let (first, last) = range.metric_time_bounds();

    db.metric_stats_by_time(metric.id, &first, &last)?
        .into_iter()
        .map(|(time, avg, n_calc, min, max)| -> Result<MetricTimePoint> {
            Ok(MetricTimePoint {
                metric_time: parse_db_timestamp(&time)?,
                avg,
                n_calc,
                min,
                max,
            })
        })
        .collect()
}

/// Write a series to `<dir>/<metric>_stats_over_time.csv`.
pub fn write_metric_stats_over_time(
    dir: &Path,
    metric_name: &str,
    rows: &[MetricTimePoint],
) -> Result<PathBuf> {
    let path = dir.join(report_file_name(metric_name, "_stats_over_time.csv"));
    write_csv_rows(&path, rows)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::metrics::{compute_count_metric, RecomputeMode};
    use crate::types::{parse_timestamp, NewEvent};
    use std::collections::BTreeSet;

    fn setup() -> Database {
        let db = Database::open_in_memory("churn_test").unwrap();
        db.create_event_tables().unwrap();
        let kinds: BTreeSet<String> = ["login", "purchase"].iter().map(|s| s.to_string()).collect();
        db.insert_event_types(&kinds).unwrap();
        let ids = db.event_type_map().unwrap();
        let events = [
            ("A", "2024-01-01 09:00:00", "login"),
            ("A", "2024-01-01 10:00:00", "login"),
            ("B", "2024-01-01 11:00:00", "login"),
            ("B", "2024-01-02 11:00:00", "login"),
            ("C", "2024-01-02 12:00:00", "purchase"),
        ];
        let rows: Vec<NewEvent> = events
            .iter()
            .map(|(account, time, kind)| NewEvent {
                account_id: account.to_string(),
                event_time: parse_timestamp(time).unwrap(),
                event_type_id: ids[*kind],
                product_id: None,
                additional_data: None,
            })
            .collect();
        db.insert_events(&rows).unwrap();
        db
    }

    fn range() -> DateRange {
        DateRange::parse("2024-01-01", "2024-01-31").unwrap()
    }

    #[test]
    fn test_coverage() {
        let db = setup();
        compute_count_metric(&db, "login", "count_login", &range(), RecomputeMode::KeepExisting)
            .unwrap();

        let coverage = metric_coverage(&db, &range()).unwrap();
        assert_eq!(coverage.len(), 1);
        let login = &coverage[0];
        assert_eq!(login.count_with_metric, 2);
        assert_eq!(login.n_account, 3);
        assert!((login.pct_coverage - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(login.max_value, 2.0);
        assert_eq!(login.min_value, 1.0);
        assert_eq!(login.earliest_metric, parse_timestamp("2024-01-02").unwrap());
        assert_eq!(login.last_metric, parse_timestamp("2024-01-03").unwrap());
    }

    #[test]
    fn test_stats_over_time() {
        let db = setup();
        compute_count_metric(&db, "login", "count_login", &range(), RecomputeMode::KeepExisting)
            .unwrap();

        let series = metric_stats_over_time(&db, "count_login", &range()).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].n_calc, 2);
        assert_eq!(series[0].avg, 1.5);
        assert_eq!(series[1].n_calc, 1);

        let err = metric_stats_over_time(&db, "count_logout", &range()).unwrap_err();
        assert!(matches!(err, Error::MetricNotFound(_)));
    }
}
