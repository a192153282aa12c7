//! Database schema
//!
//! Tables live in an ATTACHed SQLite database named after the configured
//! schema, so every statement addresses them as `<schema>.<table>`. The
//! schema name is the only identifier ever spliced into SQL text, and it is
//! validated by [`SchemaName::parse`] first; table names come from the
//! closed [`Table`] enum.

use crate::error::{Error, Result};
use rusqlite::Connection;

/// Longest accepted schema name.
const MAX_SCHEMA_NAME_LEN: usize = 63;

/// Names SQLite reserves for its own databases.
const RESERVED_SCHEMA_NAMES: &[&str] = &["main", "temp"];

/// A schema name that is safe to splice into SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaName(String);

impl SchemaName {
    /// Validate a schema name: `[A-Za-z_][A-Za-z0-9_]*`, at most 63 chars.
    pub fn parse(name: &str) -> Result<Self> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_start || !valid_rest || name.len() > MAX_SCHEMA_NAME_LEN {
            return Err(Error::Config(format!(
                "invalid schema name {:?}: use letters, digits and underscores (max {} chars)",
                name, MAX_SCHEMA_NAME_LEN
            )));
        }
        if RESERVED_SCHEMA_NAMES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(name))
        {
            return Err(Error::Config(format!(
                "schema name {:?} is reserved by SQLite",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Schema-qualified table reference, e.g. `churn_analytics.event`
    pub fn table(&self, table: Table) -> String {
        format!("{}.{}", self.0, table.as_str())
    }
}

impl std::fmt::Display for SchemaName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every table the pipeline owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    EventType,
    Event,
    MetricName,
    Metric,
}

impl Table {
    /// Drop order: dependents before the dictionaries they reference.
    pub const TEARDOWN_ORDER: [Table; 4] = [
        Table::Metric,
        Table::MetricName,
        Table::Event,
        Table::EventType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::EventType => "event_type",
            Table::Event => "event",
            Table::MetricName => "metric_name",
            Table::Metric => "metric",
        }
    }
}

/// Create event_type and event if they do not exist.
pub fn create_event_tables(conn: &Connection, schema: &SchemaName) -> Result<()> {
    let s = schema.as_str();
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {s}.event_type (
            event_type_id    INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type_name  TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS {s}.event (
            account_id       TEXT NOT NULL,
            event_time       TEXT NOT NULL,
            event_type_id    INTEGER NOT NULL REFERENCES event_type(event_type_id),
            product_id       TEXT,
            additional_data  TEXT,

            UNIQUE(account_id, event_time, event_type_id)
        );

        CREATE INDEX IF NOT EXISTS {s}.idx_event_time ON event(event_time);
        CREATE INDEX IF NOT EXISTS {s}.idx_event_type_time ON event(event_type_id, event_time);
        "#
    ))?;
    tracing::debug!(schema = s, "Event tables ready");
    Ok(())
}

/// Create metric_name and metric if they do not exist.
pub fn create_metric_tables(conn: &Connection, schema: &SchemaName) -> Result<()> {
    let s = schema.as_str();
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {s}.metric_name (
            metric_name_id   INTEGER PRIMARY KEY AUTOINCREMENT,
            metric_name      TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS {s}.metric (
            account_id       TEXT NOT NULL,
            metric_name_id   INTEGER NOT NULL REFERENCES metric_name(metric_name_id),
            metric_time      TEXT NOT NULL,
            metric_value     REAL NOT NULL,

            UNIQUE(account_id, metric_name_id, metric_time)
        );

        CREATE INDEX IF NOT EXISTS {s}.idx_metric_time ON metric(metric_time);
        CREATE INDEX IF NOT EXISTS {s}.idx_metric_name_time ON metric(metric_name_id, metric_time);
        "#
    ))?;
    tracing::debug!(schema = s, "Metric tables ready");
    Ok(())
}

/// Whether a table exists in the schema
pub fn table_exists(conn: &Connection, schema: &SchemaName, table: Table) -> Result<bool> {
    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
            schema.as_str()
        ),
        [table.as_str()],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Drop all pipeline tables in dependency order, in one transaction.
pub fn drop_all_tables(conn: &Connection, schema: &SchemaName) -> Result<Vec<Table>> {
    let tx = conn.unchecked_transaction()?;
    let mut dropped = Vec::new();
    for table in Table::TEARDOWN_ORDER {
        if table_exists(&tx, schema, table)? {
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", schema.table(table)))?;
            tracing::info!(schema = schema.as_str(), table = table.as_str(), "Dropped table");
            dropped.push(table);
        }
    }
    tx.commit()?;
    Ok(dropped)
}
