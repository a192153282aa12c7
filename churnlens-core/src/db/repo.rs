//! Database repository layer
//!
//! Provides query and insert operations for events, event types and metrics.

use super::schema::{self, SchemaName, Table};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::types::*;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Per-event-type totals over a date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTypeCounts {
    pub event_type_name: String,
    pub n_event: i64,
    pub n_account: i64,
}

/// Database handle: one connection per pipeline run.
///
/// The connection is released when the handle is dropped, on every exit
/// path. [`Database::close`] releases it explicitly and reports errors.
pub struct Database {
    conn: Connection,
    schema: SchemaName,
    schema_path: Option<PathBuf>,
}

impl Database {
    /// Open the schema file described by `config`, creating it if needed
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let schema = SchemaName::parse(&config.schema)?;
        Self::open_path(&config.schema_path(), schema)
    }

    /// Open a schema stored at an explicit path
    pub fn open_path(path: &Path, schema: SchemaName) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_in_memory()?;
        conn.execute(
            "ATTACH DATABASE ?1 AS ?2",
            params![path.to_string_lossy().into_owned(), schema.as_str()],
        )?;

        let s = schema.as_str();
        conn.execute_batch(&format!(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA {s}.journal_mode = WAL;
            PRAGMA {s}.synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            "
        ))?;

        tracing::debug!(path = %path.display(), schema = s, "Opened database");

        Ok(Self {
            conn,
            schema,
            schema_path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(schema: &str) -> Result<Self> {
        let schema = SchemaName::parse(schema)?;
        let conn = Connection::open_in_memory()?;
        conn.execute(
            "ATTACH DATABASE ':memory:' AS ?1",
            params![schema.as_str()],
        )?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn,
            schema,
            schema_path: None,
        })
    }

    /// Release the connection, surfacing any close error
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Database(e))
    }

    /// The validated schema this handle works in
    pub fn schema(&self) -> &SchemaName {
        &self.schema
    }

    /// File backing the schema (None for in-memory databases)
    pub fn schema_path(&self) -> Option<&Path> {
        self.schema_path.as_deref()
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn t(&self, table: Table) -> String {
        self.schema.table(table)
    }

    /// Create event tables if missing
    pub fn create_event_tables(&self) -> Result<()> {
        schema::create_event_tables(&self.conn, &self.schema)
    }

    /// Create metric tables if missing
    pub fn create_metric_tables(&self) -> Result<()> {
        schema::create_metric_tables(&self.conn, &self.schema)
    }

    /// Whether a pipeline table exists
    pub fn table_exists(&self, table: Table) -> Result<bool> {
        schema::table_exists(&self.conn, &self.schema, table)
    }

    /// Drop every pipeline table (metric → metric_name → event → event_type)
    pub fn drop_all_tables(&self) -> Result<Vec<Table>> {
        schema::drop_all_tables(&self.conn, &self.schema)
    }

    // ============================================
    // Event type operations
    // ============================================

    /// Insert event type names, ignoring ones that already exist.
    ///
    /// Names are inserted in sorted order so ids are deterministic for a given input.
    pub fn insert_event_types(&self, names: &BTreeSet<String>) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO {} (event_type_name) VALUES (?1)",
                self.t(Table::EventType)
            ))?;
            for name in names {
                inserted += stmt.execute([name])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Map of event type name to id
    pub fn event_type_map(&self) -> Result<HashMap<String, i64>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT event_type_name, event_type_id FROM {}",
            self.t(Table::EventType)
        ))?;
        let map = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(map)
    }

    /// Look up an event type by name
    pub fn get_event_type(&self, name: &str) -> Result<Option<EventKind>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT event_type_id, event_type_name FROM {} WHERE event_type_name = ?1",
                    self.t(Table::EventType)
                ),
                [name],
                |row| {
                    Ok(EventKind {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    /// Count event types
    pub fn count_event_types(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.t(Table::EventType)),
            [],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    // ============================================
    // Event operations
    // ============================================

    /// Insert a batch of events in one transaction.
    ///
    /// Rows whose (account_id, event_time, event_type_id) already exist are
    /// silently skipped. Returns the number of rows actually inserted.
    pub fn insert_events(&self, events: &[NewEvent]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&format!(
                r#"
                INSERT OR IGNORE INTO {} (account_id, event_time, event_type_id, product_id, additional_data)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                self.t(Table::Event)
            ))?;
            for event in events {
                inserted += stmt.execute(params![
                    event.account_id,
                    to_db_timestamp(&event.event_time),
                    event.event_type_id,
                    event.product_id,
                    event.additional_data,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Count events
    pub fn count_events(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.t(Table::Event)),
            [],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Event totals and distinct accounts per event type within a range
    pub fn event_type_counts(&self, range: &DateRange) -> Result<Vec<EventTypeCounts>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT t.event_type_name, COUNT(*) AS n_event, COUNT(DISTINCT e.account_id) AS n_account
            FROM {event} e
            INNER JOIN {event_type} t ON t.event_type_id = e.event_type_id
            WHERE e.event_time >= ?1 AND e.event_time < ?2
            GROUP BY t.event_type_name
            ORDER BY t.event_type_name
            "#,
            event = self.t(Table::Event),
            event_type = self.t(Table::EventType),
        ))?;

        let rows = stmt
            .query_map(
                params![
                    to_db_timestamp(&range.start_time()),
                    to_db_timestamp(&range.end_time_exclusive()),
                ],
                |row| {
                    Ok(EventTypeCounts {
                        event_type_name: row.get(0)?,
                        n_event: row.get(1)?,
                        n_account: row.get(2)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Number of events per day for one event type; days without events are absent
    pub fn daily_event_counts(
        &self,
        event_type_id: i64,
        range: &DateRange,
    ) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT date(event_time) AS event_date, COUNT(*) AS n_event
            FROM {}
            WHERE event_type_id = ?1 AND event_time >= ?2 AND event_time < ?3
            GROUP BY event_date
            ORDER BY event_date
            "#,
            self.t(Table::Event)
        ))?;

        let rows = stmt
            .query_map(
                params![
                    event_type_id,
                    to_db_timestamp(&range.start_time()),
                    to_db_timestamp(&range.end_time_exclusive()),
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Distinct accounts with at least one event at or after `since`
    pub fn count_active_accounts(&self, since: &NaiveDateTime) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(DISTINCT account_id) FROM {} WHERE event_time >= ?1",
                self.t(Table::Event)
            ),
            [to_db_timestamp(since)],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Distinct accounts with at least one event inside the range
    pub fn count_accounts_in_range(&self, range: &DateRange) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(DISTINCT account_id) FROM {} WHERE event_time >= ?1 AND event_time < ?2",
                self.t(Table::Event)
            ),
            params![
                to_db_timestamp(&range.start_time()),
                to_db_timestamp(&range.end_time_exclusive()),
            ],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    // ============================================
    // Metric name operations
    // ============================================

    /// Return the id for a metric name, creating the definition on first use
    pub fn get_or_create_metric_name(&self, name: &str) -> Result<MetricDefinition> {
        self.conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (metric_name) VALUES (?1)",
                self.t(Table::MetricName)
            ),
            [name],
        )?;
        self.get_metric_name(name)?
            .ok_or_else(|| Error::MetricNotFound(name.to_string()))
    }

    /// Look up a metric definition by name
    pub fn get_metric_name(&self, name: &str) -> Result<Option<MetricDefinition>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT metric_name_id, metric_name FROM {} WHERE metric_name = ?1",
                    self.t(Table::MetricName)
                ),
                [name],
                |row| {
                    Ok(MetricDefinition {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    /// All metric definitions in creation order
    pub fn list_metric_names(&self) -> Result<Vec<MetricDefinition>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT metric_name_id, metric_name FROM {} ORDER BY metric_name_id",
            self.t(Table::MetricName)
        ))?;
        let names = stmt
            .query_map([], |row| {
                Ok(MetricDefinition {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    // ============================================
    // Metric value operations
    // ============================================

    /// Insert per-(account, day) counts of one event type as metric values.
    ///
    /// Each day's count is stamped at the end of its window, `(day + 1) 00:00`.
    /// Existing (account, metric, time) rows are left untouched. When
    /// `replace_existing` is set, the metric's values in the range's
    /// metric-time window are deleted first, in the same transaction.
    ///
    /// Returns the number of rows inserted.
    pub fn insert_daily_count_metric(
        &self,
        metric_name_id: i64,
        event_type_id: i64,
        range: &DateRange,
        replace_existing: bool,
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        if replace_existing {
            let (first, last) = range.metric_time_bounds();
            let deleted = tx.execute(
                &format!(
                    "DELETE FROM {} WHERE metric_name_id = ?1 AND metric_time >= ?2 AND metric_time <= ?3",
                    self.t(Table::Metric)
                ),
                params![
                    metric_name_id,
                    to_db_timestamp(&first),
                    to_db_timestamp(&last)
                ],
            )?;
            tracing::debug!(metric_name_id, deleted, "Cleared previous metric values");
        }

        let inserted = tx.execute(
            &format!(
                r#"
                INSERT OR IGNORE INTO {metric} (account_id, metric_name_id, metric_time, metric_value)
                SELECT e.account_id,
                       ?1,
                       strftime('%Y-%m-%d %H:%M:%S.000000', e.event_time, 'start of day', '+1 day')
                           AS metric_time,
                       COUNT(*) AS metric_value
                FROM {event} e
                WHERE e.event_type_id = ?2
                  AND e.event_time >= ?3
                  AND e.event_time < ?4
                GROUP BY e.account_id, date(e.event_time)
                "#,
                metric = self.t(Table::Metric),
                event = self.t(Table::Event),
            ),
            params![
                metric_name_id,
                event_type_id,
                to_db_timestamp(&range.start_time()),
                to_db_timestamp(&range.end_time_exclusive()),
            ],
        )?;

        tx.commit()?;
        Ok(inserted)
    }

    /// Insert explicit metric values, ignoring duplicates
    pub fn insert_metric_values(&self, values: &[MetricValue]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&format!(
                r#"
                INSERT OR IGNORE INTO {} (account_id, metric_name_id, metric_time, metric_value)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                self.t(Table::Metric)
            ))?;
            for value in values {
                inserted += stmt.execute(params![
                    value.account_id,
                    value.metric_name_id,
                    to_db_timestamp(&value.metric_time),
                    value.value,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Count stored values for one metric
    pub fn count_metric_values(&self, metric_name_id: i64) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE metric_name_id = ?1",
                self.t(Table::Metric)
            ),
            [metric_name_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// All values of one metric for one account, oldest first
    pub fn get_account_metric_values(
        &self,
        account_id: &str,
        metric_name_id: i64,
    ) -> Result<Vec<MetricValue>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT account_id, metric_name_id, metric_time, metric_value
            FROM {}
            WHERE account_id = ?1 AND metric_name_id = ?2
            ORDER BY metric_time
            "#,
            self.t(Table::Metric)
        ))?;

        let rows = stmt
            .query_map(params![account_id, metric_name_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(account_id, metric_name_id, time, value)| -> Result<MetricValue> {
                Ok(MetricValue {
                    account_id,
                    metric_name_id,
                    metric_time: parse_db_timestamp(&time)?,
                    value,
                })
            })
            .collect()
    }

    /// Latest metric timestamp across all metrics
    pub fn latest_metric_time(&self) -> Result<Option<NaiveDateTime>> {
        let latest: Option<String> = self.conn.query_row(
            &format!("SELECT MAX(metric_time) FROM {}", self.t(Table::Metric)),
            [],
            |r| r.get(0),
        )?;
        latest.as_deref().map(parse_db_timestamp).transpose()
    }

    /// Long-format (account, metric name, value) rows at exactly `metric_time`,
    /// restricted to accounts with an event at or after `active_since`.
    pub fn metric_values_at(
        &self,
        metric_time: &NaiveDateTime,
        active_since: &NaiveDateTime,
    ) -> Result<Vec<(String, String, f64)>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT m.account_id, n.metric_name, m.metric_value
            FROM {metric} m
            INNER JOIN {metric_name} n ON n.metric_name_id = m.metric_name_id
            WHERE m.metric_time = ?1
              AND m.account_id IN (
                  SELECT DISTINCT account_id FROM {event} WHERE event_time >= ?2
              )
            ORDER BY m.account_id, n.metric_name
            "#,
            metric = self.t(Table::Metric),
            metric_name = self.t(Table::MetricName),
            event = self.t(Table::Event),
        ))?;

        let rows = stmt
            .query_map(
                params![to_db_timestamp(metric_time), to_db_timestamp(active_since)],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Raw coverage aggregates per metric over a metric-time window.
    ///
    /// Returns (metric_name, accounts with metric, avg, min, max, earliest, latest).
    #[allow(clippy::type_complexity)]
    pub fn metric_coverage_rows(
        &self,
        first: &NaiveDateTime,
        last: &NaiveDateTime,
    ) -> Result<Vec<(String, i64, f64, f64, f64, String, String)>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT n.metric_name,
                   COUNT(DISTINCT m.account_id) AS count_with_metric,
                   AVG(m.metric_value) AS avg_value,
                   MIN(m.metric_value) AS min_value,
                   MAX(m.metric_value) AS max_value,
                   MIN(m.metric_time) AS earliest_metric,
                   MAX(m.metric_time) AS last_metric
            FROM {metric} m
            INNER JOIN {metric_name} n ON n.metric_name_id = m.metric_name_id
            WHERE m.metric_time >= ?1 AND m.metric_time <= ?2
            GROUP BY n.metric_name_id, n.metric_name
            ORDER BY n.metric_name_id
            "#,
            metric = self.t(Table::Metric),
            metric_name = self.t(Table::MetricName),
        ))?;

        let rows = stmt
            .query_map(
                params![to_db_timestamp(first), to_db_timestamp(last)],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Per-timestamp aggregates for one metric: (time, avg, n, min, max)
    pub fn metric_stats_by_time(
        &self,
        metric_name_id: i64,
        first: &NaiveDateTime,
        last: &NaiveDateTime,
    ) -> Result<Vec<(String, f64, i64, f64, f64)>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT metric_time, AVG(metric_value), COUNT(*), MIN(metric_value), MAX(metric_value)
            FROM {}
            WHERE metric_name_id = ?1 AND metric_time >= ?2 AND metric_time <= ?3
            GROUP BY metric_time
            ORDER BY metric_time
            "#,
            self.t(Table::Metric)
        ))?;

        let rows = stmt
            .query_map(
                params![metric_name_id, to_db_timestamp(first), to_db_timestamp(last)],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
