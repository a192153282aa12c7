//! Ingestion layer for event CSV files
//!
//! Loading runs in two passes over the file:
//!
//! ```text
//! ┌──────────┐  pass 1: event kinds  ┌────────────┐
//! │ CSV file │ ────────────────────► │ event_type │
//! │ (chunks) │  pass 2: event rows   ├────────────┤
//! │          │ ────────────────────► │   event    │
//! └──────────┘   (batched commits)   └────────────┘
//! ```
//!
//! Every event kind must be in the dictionary before any event row is
//! written, so the first pass reads the whole file. Rows are then inserted
//! in batches that commit independently; re-running a load over the same
//! file is safe because duplicate (account, time, kind) rows are ignored.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use churnlens_core::{Config, Database};
//! use churnlens_core::ingest::{load_csv, LoadOptions};
//!
//! let config = Config::load()?;
//! let db = Database::open(&config.database)?;
//! let result = load_csv(path, &db, &LoadOptions::from(&config.pipeline))?;
//! println!("Inserted {} events", result.rows_inserted);
//! ```

mod reader;

pub use reader::{EventCsvReader, RawEventRow, REQUIRED_COLUMNS};

use crate::config::PipelineConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::{parse_timestamp, NewEvent};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Chunking parameters for a load.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Rows per insert transaction
    pub batch_size: usize,
    /// Rows read from the file at a time
    pub chunk_size: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for LoadOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            chunk_size: config.chunk_size,
        }
    }
}

/// Result of loading one CSV file.
#[derive(Debug, Default, Clone, Serialize)]
pub struct LoadResult {
    /// Data rows read from the file
    pub rows_read: usize,
    /// Rows dropped for a blank account/type or an unparseable time
    pub rows_skipped: usize,
    /// Rows handed to the database
    pub rows_submitted: usize,
    /// Rows actually inserted (duplicates excluded)
    pub rows_inserted: usize,
    /// Distinct event kinds seen in the file
    pub event_kinds: usize,
    /// Event kinds new to the dictionary
    pub event_kinds_inserted: usize,
    /// Committed insert batches
    pub batches: usize,
    /// Events in the store after the load
    pub total_events: i64,
    /// Event kinds in the store after the load
    pub total_event_kinds: i64,
}

/// Load an event CSV into the store.
pub fn load_csv(path: &Path, db: &Database, options: &LoadOptions) -> Result<LoadResult> {
    load_csv_with_progress(path, db, options, |_| {})
}

/// Load an event CSV, calling `on_batch` after each committed batch.
///
/// The callback receives the running totals, so callers can show progress.
pub fn load_csv_with_progress<F>(
    path: &Path,
    db: &Database,
    options: &LoadOptions,
    mut on_batch: F,
) -> Result<LoadResult>
where
    F: FnMut(&LoadResult),
{
    if options.batch_size == 0 || options.chunk_size == 0 {
        return Err(Error::InvalidInput(
            "batch_size and chunk_size must be at least 1".to_string(),
        ));
    }

    db.create_event_tables()?;
    let mut result = LoadResult::default();

    // Pass 1: collect every event kind before writing events
    let kinds = collect_event_kinds(path, options.chunk_size)?;
    result.event_kinds = kinds.len();
    result.event_kinds_inserted = db.insert_event_types(&kinds)?;
    tracing::info!(
        path = %path.display(),
        event_kinds = result.event_kinds,
        new_event_kinds = result.event_kinds_inserted,
        "Event types loaded"
    );

    let type_ids = db.event_type_map()?;

    // Pass 2: insert events in batches
    let mut reader = EventCsvReader::open(path, options.chunk_size)?;
    let mut batch: Vec<NewEvent> = Vec::with_capacity(options.batch_size.min(16_384));

    while let Some(chunk) = reader.next_chunk()? {
        result.rows_read += chunk.len();

        for row in chunk {
            match to_event(row, &type_ids) {
                Some(event) => batch.push(event),
                None => result.rows_skipped += 1,
            }
            if batch.len() >= options.batch_size {
                flush(db, &mut batch, &mut result)?;
                on_batch(&result);
            }
        }
    }
    if !batch.is_empty() {
        flush(db, &mut batch, &mut result)?;
        on_batch(&result);
    }

    if result.rows_skipped > 0 {
        tracing::warn!(
            skipped = result.rows_skipped,
            "Skipped rows with blank account/event type or unparseable time"
        );
    }

    result.total_events = db.count_events()?;
    result.total_event_kinds = db.count_event_types()?;

    tracing::info!(
        rows_read = result.rows_read,
        rows_inserted = result.rows_inserted,
        total_events = result.total_events,
        "Load complete"
    );

    Ok(result)
}

fn collect_event_kinds(path: &Path, chunk_size: usize) -> Result<BTreeSet<String>> {
    let mut reader = EventCsvReader::open(path, chunk_size)?;
    let mut kinds = BTreeSet::new();
    while let Some(chunk) = reader.next_chunk()? {
        kinds.extend(
            chunk
                .into_iter()
                .map(|row| row.event_type)
                .filter(|kind| !kind.is_empty()),
        );
    }
    Ok(kinds)
}

fn to_event(row: RawEventRow, type_ids: &HashMap<String, i64>) -> Option<NewEvent> {
    if row.account_id.is_empty() {
        return None;
    }
    let event_type_id = *type_ids.get(&row.event_type)?;
    let event_time = parse_timestamp(&row.event_time)?;

    Some(NewEvent {
        account_id: row.account_id,
        event_time,
        event_type_id,
        product_id: row.product_id,
        additional_data: row.additional_data,
    })
}

fn flush(db: &Database, batch: &mut Vec<NewEvent>, result: &mut LoadResult) -> Result<()> {
    let inserted = db.insert_events(batch)?;
    result.rows_submitted += batch.len();
    result.rows_inserted += inserted;
    result.batches += 1;
    tracing::debug!(
        batch = result.batches,
        submitted = batch.len(),
        inserted,
        "Committed event batch"
    );
    batch.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_skips_bad_rows() {
        let db = Database::open_in_memory("churn_test").unwrap();
        let file = csv_file(
            "account_id,event_time,event_type\n\
             A,2024-01-01 09:00:00,login\n\
             ,2024-01-01 10:00:00,login\n\
             B,yesterday,login\n\
             C,2024-01-03 12:00:00,\n\
             D,2024-01-04T08:15:00,purchase\n",
        );

        let result = load_csv(file.path(), &db, &LoadOptions::default()).unwrap();

        assert_eq!(result.rows_read, 5);
        assert_eq!(result.rows_skipped, 3);
        assert_eq!(result.rows_inserted, 2);
        assert_eq!(result.event_kinds, 2);
        assert_eq!(result.total_events, 2);
    }

    #[test]
    fn test_sub_second_events_stay_distinct() {
        let db = Database::open_in_memory("churn_test").unwrap();
        let file = csv_file(
            "account_id,event_time,event_type\n\
             A,2024-01-15 10:30:00.250,click\n\
             A,2024-01-15 10:30:00.750,click\n\
             A,2024-01-15 10:30:00.750,click\n",
        );

        let result = load_csv(file.path(), &db, &LoadOptions::default()).unwrap();
        assert_eq!(result.rows_submitted, 3);
        assert_eq!(result.rows_inserted, 2);
        assert_eq!(result.total_events, 2);

        let range = crate::types::DateRange::parse("2024-01-01", "2024-01-31").unwrap();
        let run = crate::analytics::compute_count_metric(
            &db,
            "click",
            "count_click",
            &range,
            crate::analytics::RecomputeMode::KeepExisting,
        )
        .unwrap();
        let values = db.get_account_metric_values("A", run.metric_name_id).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, 2.0);
        assert_eq!(
            values[0].metric_time,
            parse_timestamp("2024-01-16 00:00:00").unwrap()
        );
    }

    #[test]
    fn test_batches_commit_independently() {
        let db = Database::open_in_memory("churn_test").unwrap();
        let mut content = String::from("account_id,event_time,event_type\n");
        for day in 1..=7 {
            content.push_str(&format!("A,2024-01-0{} 09:00:00,login\n", day));
        }
        let file = csv_file(&content);
        let options = LoadOptions {
            batch_size: 3,
            chunk_size: 2,
        };

        let mut progress = Vec::new();
        let result = load_csv_with_progress(file.path(), &db, &options, |r| {
            progress.push(r.rows_submitted)
        })
        .unwrap();

        assert_eq!(result.batches, 3);
        assert_eq!(progress, vec![3, 6, 7]);
        assert_eq!(result.total_events, 7);
    }

    #[test]
    fn test_missing_columns_writes_nothing() {
        let db = Database::open_in_memory("churn_test").unwrap();
        let file = csv_file("account_id,event_time\nA,2024-01-01\n");

        let err = load_csv(file.path(), &db, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MissingColumns { .. }));
        assert_eq!(db.count_event_types().unwrap(), 0);
    }
}
