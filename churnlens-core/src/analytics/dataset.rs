//! Current customer dataset
//!
//! One row per active account at the latest metric time, one column per
//! metric definition. Built fresh on every run:
//!
//! 1. `latest_time` = newest metric timestamp
//! 2. columns = every metric name, in creation order
//! 3. active accounts = accounts with an event at or after
//!    `latest_time - active_window_days`
//! 4. values = metric rows at exactly `latest_time` for active accounts
//! 5. pivot to wide form, filling absent metrics with 0.0

use crate::db::{Database, Table};
use crate::error::{Error, Result};
use crate::types::{parse_timestamp, to_report_timestamp};
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Index column holding the account id.
pub const ACCOUNT_COLUMN: &str = "account_id";
/// Index column holding the metric timestamp.
pub const TIME_COLUMN: &str = "last_metric_time";

/// One account's features.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetRow {
    pub account_id: String,
    pub last_metric_time: NaiveDateTime,
    /// One value per metric column; NaN only in datasets read from disk
    pub values: Vec<f64>,
}

/// Wide per-account feature table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerDataset {
    pub metric_names: Vec<String>,
    pub rows: Vec<DatasetRow>,
}

impl CustomerDataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of one column, in row order
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows
            .iter()
            .map(|r| r.values.get(index).copied().unwrap_or(f64::NAN))
            .collect()
    }

    /// Value of a metric for an account
    pub fn value(&self, account_id: &str, metric: &str) -> Option<f64> {
        let column = self.metric_names.iter().position(|m| m == metric)?;
        self.rows
            .iter()
            .find(|r| r.account_id == account_id)
            .and_then(|r| r.values.get(column).copied())
    }

    /// Write as CSV: the two index columns, then one column per metric.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut writer = csv::Writer::from_path(path)?;

        let mut header = vec![ACCOUNT_COLUMN.to_string(), TIME_COLUMN.to_string()];
        header.extend(self.metric_names.iter().cloned());
        writer.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![row.account_id.clone(), to_report_timestamp(&row.last_metric_time)];
            record.extend(row.values.iter().map(|v| {
                if v.is_nan() {
                    String::new()
                } else {
                    v.to_string()
                }
            }));
            writer.write_record(&record)?;
        }
        writer.flush()?;

        tracing::info!(
            path = %path.display(),
            rows = self.rows.len(),
            columns = self.metric_names.len(),
            "Wrote dataset"
        );
        Ok(())
    }

    /// Read a wide table indexed by (account id, timestamp).
    ///
    /// Empty cells become NaN and `true`/`false` become 1/0. Any other
    /// non-numeric cell, a bad timestamp or a missing index column is an
    /// invalid-input error.
    pub fn read_csv(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::InvalidInput(format!(
                "dataset file not found: {}",
                path.display()
            )));
        }

        let invalid = |msg: String| Error::InvalidInput(format!("{}: {}", path.display(), msg));

        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers = reader.headers()?.clone();
        if headers.len() < 2 {
            return Err(invalid(format!(
                "expected two index columns (account id, timestamp), found {} column(s)",
                headers.len()
            )));
        }
        let metric_names: Vec<String> = headers.iter().skip(2).map(|h| h.to_string()).collect();

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            // Header is line 1
            let line = line + 2;
            if record.len() != headers.len() {
                return Err(invalid(format!(
                    "line {}: expected {} fields, found {}",
                    line,
                    headers.len(),
                    record.len()
                )));
            }

            let account_id = record[0].to_string();
            let last_metric_time = parse_timestamp(&record[1])
                .ok_or_else(|| invalid(format!("line {}: bad timestamp {:?}", line, &record[1])))?;
            let values = record
                .iter()
                .skip(2)
                .map(|cell| {
                    parse_cell(cell)
                        .ok_or_else(|| invalid(format!("line {}: non-numeric value {:?}", line, cell)))
                })
                .collect::<Result<Vec<_>>>()?;

            rows.push(DatasetRow {
                account_id,
                last_metric_time,
                values,
            });
        }

        Ok(Self { metric_names, rows })
    }
}

fn parse_cell(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Some(f64::NAN);
    }
    if cell.eq_ignore_ascii_case("true") {
        return Some(1.0);
    }
    if cell.eq_ignore_ascii_case("false") {
        return Some(0.0);
    }
    cell.parse().ok()
}

/// Start of the activity window ending at `latest_time`.
///
/// A window reaching past the earliest representable time covers every event.
pub fn active_since(latest_time: &NaiveDateTime, active_window_days: i64) -> Result<NaiveDateTime> {
    if active_window_days < 0 {
        return Err(Error::InvalidInput(format!(
            "active window must not be negative, got {} days",
            active_window_days
        )));
    }
    Ok(Duration::try_days(active_window_days)
        .and_then(|window| latest_time.checked_sub_signed(window))
        .unwrap_or(NaiveDateTime::MIN))
}

/// Assemble the dataset at the latest metric time.
pub fn create_current_dataset(db: &Database, active_window_days: i64) -> Result<CustomerDataset> {
    for table in [Table::Event, Table::MetricName, Table::Metric] {
        if !db.table_exists(table)? {
            return Err(Error::DataUnavailable(format!(
                "table {} does not exist; load events and calculate metrics first",
                db.schema().table(table)
            )));
        }
    }

    let latest_time = db.latest_metric_time()?.ok_or_else(|| {
        Error::DataUnavailable("no metrics found; calculate metrics first".to_string())
    })?;

    let metric_names: Vec<String> = db
        .list_metric_names()?
        .into_iter()
        .map(|m| m.name)
        .collect();
    let columns: HashMap<&str, usize> = metric_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let active_since = active_since(&latest_time, active_window_days)?;
    let active_accounts = db.count_active_accounts(&active_since)?;
    tracing::debug!(
        latest_time = %latest_time,
        active_since = %active_since,
        active_accounts,
        "Assembling dataset"
    );

    let long_rows = db.metric_values_at(&latest_time, &active_since)?;
    if long_rows.is_empty() {
        return Err(Error::DataUnavailable(format!(
            "no metric values at {} for accounts active since {}; metrics may not be up to date",
            to_report_timestamp(&latest_time),
            to_report_timestamp(&active_since)
        )));
    }

    let mut wide: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (account_id, metric, value) in long_rows {
        let Some(&column) = columns.get(metric.as_str()) else {
            continue;
        };
        wide.entry(account_id)
            .or_insert_with(|| vec![0.0; metric_names.len()])[column] = value;
    }

    let rows: Vec<DatasetRow> = wide
        .into_iter()
        .map(|(account_id, values)| DatasetRow {
            account_id,
            last_metric_time: latest_time,
            values,
        })
        .collect();

    tracing::info!(
        latest_time = %latest_time,
        accounts = rows.len(),
        metrics = metric_names.len(),
        "Assembled current dataset"
    );

    Ok(CustomerDataset { metric_names, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{parse_timestamp, MetricValue, NewEvent};
    use std::collections::BTreeSet;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn setup() -> Database {
        let db = Database::open_in_memory("churn_test").unwrap();
        db.create_event_tables().unwrap();
        db.create_metric_tables().unwrap();
        let kinds: BTreeSet<String> = ["login".to_string()].into_iter().collect();
        db.insert_event_types(&kinds).unwrap();
        db
    }

    fn add_event(db: &Database, account: &str, time: &str) {
        let login = db.event_type_map().unwrap()["login"];
        db.insert_events(&[NewEvent {
            account_id: account.to_string(),
            event_time: ts(time),
            event_type_id: login,
            product_id: None,
            additional_data: None,
        }])
        .unwrap();
    }

    fn add_metric(db: &Database, account: &str, metric: &str, time: &str, value: f64) {
        let id = db.get_or_create_metric_name(metric).unwrap().id;
        db.insert_metric_values(&[MetricValue {
            account_id: account.to_string(),
            metric_name_id: id,
            metric_time: ts(time),
            value,
        }])
        .unwrap();
    }

    #[test]
    fn test_no_metrics_is_unavailable() {
        let db = setup();
        let err = create_current_dataset(&db, 90).unwrap_err();
        assert!(matches!(err, Error::DataUnavailable(_)));

        let bare = Database::open_in_memory("churn_test").unwrap();
        assert!(matches!(
            create_current_dataset(&bare, 90).unwrap_err(),
            Error::DataUnavailable(_)
        ));
    }

    #[test]
    fn test_pivot_fills_zero_and_uses_latest_time() {
        let db = setup();
        add_event(&db, "A", "2024-03-30 10:00:00");
        add_event(&db, "B", "2024-03-30 11:00:00");
        add_metric(&db, "A", "count_login", "2024-03-31", 3.0);
        add_metric(&db, "B", "count_purchase", "2024-03-31", 1.0);
        // Older values are not part of the snapshot
        add_metric(&db, "A", "count_purchase", "2024-03-01", 9.0);

        let dataset = create_current_dataset(&db, 90).unwrap();

        assert_eq!(dataset.metric_names, vec!["count_login", "count_purchase"]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows[0].account_id, "A");
        assert_eq!(dataset.rows[0].last_metric_time, ts("2024-03-31"));
        assert_eq!(dataset.value("A", "count_purchase"), Some(0.0));
        assert_eq!(dataset.value("B", "count_login"), Some(0.0));
        assert_eq!(dataset.value("B", "count_purchase"), Some(1.0));
    }

    #[test]
    fn test_metric_without_values_is_zero_column() {
        let db = setup();
        add_event(&db, "A", "2024-03-30 10:00:00");
        db.get_or_create_metric_name("count_logout").unwrap();
        add_metric(&db, "A", "count_login", "2024-03-31", 3.0);

        let dataset = create_current_dataset(&db, 90).unwrap();
        assert_eq!(dataset.metric_names, vec!["count_logout", "count_login"]);
        assert_eq!(dataset.rows[0].values, vec![0.0, 3.0]);
    }

    #[test]
    fn test_dormant_accounts_excluded() {
        let db = setup();
        add_event(&db, "A", "2024-03-30 10:00:00");
        add_event(&db, "Z", "2023-10-01 10:00:00");
        add_metric(&db, "A", "count_login", "2024-03-31", 1.0);
        add_metric(&db, "Z", "count_login", "2024-03-31", 5.0);

        let dataset = create_current_dataset(&db, 90).unwrap();
        let accounts: Vec<&str> = dataset.rows.iter().map(|r| r.account_id.as_str()).collect();
        assert_eq!(accounts, vec!["A"]);

        // A wider window brings Z back
        let dataset = create_current_dataset(&db, 365).unwrap();
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn test_active_since_bounds() {
        let latest = ts("2024-03-31");
        assert_eq!(active_since(&latest, 0).unwrap(), latest);
        assert_eq!(active_since(&latest, 90).unwrap(), ts("2024-01-01"));
        assert_eq!(active_since(&latest, i64::MAX).unwrap(), NaiveDateTime::MIN);
        assert!(matches!(
            active_since(&latest, -1).unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[test]
    fn test_huge_window_includes_every_account() {
        let db = setup();
        add_event(&db, "A", "2024-03-30 10:00:00");
        add_event(&db, "Z", "2001-01-01 10:00:00");
        add_metric(&db, "A", "count_login", "2024-03-31", 1.0);
        add_metric(&db, "Z", "count_login", "2024-03-31", 5.0);

        let dataset = create_current_dataset(&db, 100_000_000).unwrap();
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn test_no_active_accounts_is_unavailable() {
        let db = setup();
        add_event(&db, "Z", "2023-01-01 10:00:00");
        add_metric(&db, "Z", "count_login", "2024-03-31", 5.0);

        let err = create_current_dataset(&db, 90).unwrap_err();
        assert!(matches!(err, Error::DataUnavailable(_)));
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("current").join("churn_dataset.csv");
        let dataset = CustomerDataset {
            metric_names: vec!["count_login".to_string(), "count_purchase".to_string()],
            rows: vec![DatasetRow {
                account_id: "A".to_string(),
                last_metric_time: ts("2024-03-31"),
                values: vec![2.0, 0.5],
            }],
        };

        dataset.write_csv(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("account_id,last_metric_time,count_login,count_purchase\n"));
        assert!(content.contains("A,2024-03-31 00:00:00,2,0.5"));

        assert_eq!(CustomerDataset::read_csv(&path).unwrap(), dataset);
    }

    #[test]
    fn test_read_csv_cells() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            b"account_id,last_metric_time,active,score\n\
              A,2024-03-31,true,\n\
              B,2024-03-31 00:00:00,false,-2.5\n",
        )
        .unwrap();

        let dataset = CustomerDataset::read_csv(file.path()).unwrap();
        assert_eq!(dataset.rows[0].values[0], 1.0);
        assert!(dataset.rows[0].values[1].is_nan());
        assert_eq!(dataset.rows[1].values, vec![0.0, -2.5]);
    }

    #[test]
    fn test_read_csv_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let missing = CustomerDataset::read_csv(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(missing, Error::InvalidInput(_)));

        for content in [
            "account_id\nA\n",
            "account_id,last_metric_time,x\nA,not-a-time,1\n",
            "account_id,last_metric_time,x\nA,2024-03-31,abc\n",
        ] {
            let path = dir.path().join("bad.csv");
            std::fs::write(&path, content).unwrap();
            let err = CustomerDataset::read_csv(&path).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{content}: {err}");
        }
    }
}
