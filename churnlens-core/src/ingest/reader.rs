//! Chunked reader for event CSV files

use crate::error::{Error, Result};
use std::fs::File;
use std::path::Path;

/// Columns every event file must carry.
pub const REQUIRED_COLUMNS: [&str; 3] = ["account_id", "event_time", "event_type"];

/// One CSV row, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEventRow {
    pub account_id: String,
    pub event_time: String,
    pub event_type: String,
    pub product_id: Option<String>,
    pub additional_data: Option<String>,
}

/// Column positions resolved from the header.
#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    account_id: usize,
    event_time: usize,
    event_type: usize,
    product_id: Option<usize>,
    additional_data: Option<usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let found: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
        let position = |name: &str| found.iter().position(|h| h == name);

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| position(c).is_none())
            .map(|c| c.to_string())
            .collect();

        match (
            position("account_id"),
            position("event_time"),
            position("event_type"),
        ) {
            (Some(account_id), Some(event_time), Some(event_type)) => Ok(Self {
                account_id,
                event_time,
                event_type,
                product_id: position("product_id"),
                additional_data: position("additional_data"),
            }),
            _ => Err(Error::MissingColumns { missing, found }),
        }
    }
}

/// Reads an event CSV in bounded chunks.
pub struct EventCsvReader {
    reader: csv::Reader<File>,
    columns: ColumnIndex,
    chunk_size: usize,
    record: csv::StringRecord,
}

impl EventCsvReader {
    /// Open a file and validate its header.
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::InvalidInput(format!("cannot open {}: {}", path.display(), e))
        })?;
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let columns = ColumnIndex::from_headers(reader.headers()?)?;

        Ok(Self {
            reader,
            columns,
            chunk_size: chunk_size.max(1),
            record: csv::StringRecord::new(),
        })
    }

    /// Next chunk of at most `chunk_size` rows; `None` at end of file.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<RawEventRow>>> {
        let mut chunk = Vec::with_capacity(self.chunk_size.min(16_384));
        while chunk.len() < self.chunk_size && self.reader.read_record(&mut self.record)? {
            chunk.push(self.row());
        }
        Ok(if chunk.is_empty() { None } else { Some(chunk) })
    }

    fn row(&self) -> RawEventRow {
        let field = |i: usize| self.record.get(i).unwrap_or("").trim().to_string();
        let optional = |i: Option<usize>| {
            i.and_then(|i| self.record.get(i))
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.to_string())
        };

        RawEventRow {
            account_id: field(self.columns.account_id),
            event_time: field(self.columns.event_time),
            event_type: field(self.columns.event_type),
            product_id: optional(self.columns.product_id).map(|v| v.trim().to_string()),
            additional_data: optional(self.columns.additional_data),
        }
    }
}
