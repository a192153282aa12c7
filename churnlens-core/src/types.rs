//! Core domain types for churnlens
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Account** | The customer whose behavior is tracked, identified by an opaque string |
//! | **Event kind** | Categorical label for observed activity ("login", "purchase") |
//! | **Event** | One occurrence of an event kind for an account at a point in time |
//! | **Metric** | A named, time-stamped, per-account numeric measurement |
//! | **Common event** | An event kind whose per-account-per-month frequency exceeds a threshold |
//!
//! All timestamps are naive UTC. They are stored as fixed-width
//! `YYYY-MM-DD HH:MM:SS.ffffff` text so that SQLite text comparison orders
//! them chronologically and sub-second event times stay distinct.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// Storage format for all timestamps (microsecond precision, fixed width).
pub const DB_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Format used when a timestamp is written to a report file.
pub const REPORT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Days per month used when normalizing event frequencies.
pub const DAYS_PER_MONTH: f64 = 30.0;

/// Format a timestamp for storage.
pub fn to_db_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(DB_TIMESTAMP_FORMAT).to_string()
}

/// Format a timestamp for a report; the fraction is omitted when zero.
pub fn to_report_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(REPORT_TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp previously written with [`to_db_timestamp`].
///
/// Values without a fractional part are accepted as well.
pub fn parse_db_timestamp(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, REPORT_TIMESTAMP_FORMAT)
        .map_err(|e| Error::InvalidInput(format!("bad stored timestamp {:?}: {}", value, e)))
}

/// Parse an event timestamp from loosely formatted input.
///
/// Accepts `YYYY-MM-DD HH:MM:SS[.fff]`, the same with a `T` separator,
/// RFC 3339 with an offset (converted to UTC) and bare dates (midnight).
/// Returns `None` for anything else.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts);
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

// ============================================
// Date ranges
// ============================================

/// An inclusive range of calendar days.
///
/// Events fall in the range when `start 00:00 <= event_time < (end + 1) 00:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting `end < start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidInput(format!(
                "end date {} is before start date {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse a range from `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| {
                Error::InvalidInput(format!("invalid date {:?} (expected YYYY-MM-DD): {}", s, e))
            })
        };
        Self::new(parse(start)?, parse(end)?)
    }

    /// First instant inside the range.
    pub fn start_time(&self) -> NaiveDateTime {
        self.start.and_time(NaiveTime::MIN)
    }

    /// First instant after the range.
    pub fn end_time_exclusive(&self) -> NaiveDateTime {
        self.end.and_time(NaiveTime::MIN) + Duration::days(1)
    }

    /// Elapsed days between start and end (0 for a single-day range).
    pub fn elapsed_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Elapsed months, at [`DAYS_PER_MONTH`] days per month.
    pub fn months(&self) -> f64 {
        self.elapsed_days() as f64 / DAYS_PER_MONTH
    }

    /// Every day in the range, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..=self.elapsed_days()).map(move |offset| start + Duration::days(offset))
    }

    /// Earliest and latest metric timestamps a daily metric over this range can carry.
    ///
    /// A daily metric for day D is stamped at the end of its window, `(D + 1) 00:00`.
    pub fn metric_time_bounds(&self) -> (NaiveDateTime, NaiveDateTime) {
        (
            self.start_time() + Duration::days(1),
            self.end_time_exclusive(),
        )
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ============================================
// Events
// ============================================

/// A named category of account activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventKind {
    pub id: i64,
    pub name: String,
}

/// An event ready to be written to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub account_id: String,
    pub event_time: NaiveDateTime,
    pub event_type_id: i64,
    pub product_id: Option<String>,
    pub additional_data: Option<String>,
}

// ============================================
// Metrics
// ============================================

/// A named derived quantity, e.g. `count_login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDefinition {
    pub id: i64,
    pub name: String,
}

/// One computed measurement for one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricValue {
    pub account_id: String,
    pub metric_name_id: i64,
    pub metric_time: NaiveDateTime,
    pub value: f64,
}

/// Name of the count metric derived from an event kind.
pub fn count_metric_name(event_kind: &str) -> String {
    format!("count_{}", event_kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_january_is_one_month() {
        let range = DateRange::parse("2024-01-01", "2024-01-31").unwrap();
        assert_eq!(range.elapsed_days(), 30);
        assert_eq!(range.months(), 1.0);
        assert_eq!(range.days().count(), 31);
    }

    #[test]
    fn test_single_day_range_has_zero_months() {
        let range = DateRange::parse("2024-03-05", "2024-03-05").unwrap();
        assert_eq!(range.months(), 0.0);
        assert_eq!(range.days().collect::<Vec<_>>(), vec![date("2024-03-05")]);
    }

    #[test]
    fn test_reversed_range_rejected() {
        assert!(DateRange::parse("2024-02-01", "2024-01-01").is_err());
        assert!(DateRange::parse("2024-13-01", "2024-12-01").is_err());
    }

    #[test]
    fn test_range_bounds() {
        let range = DateRange::parse("2024-01-01", "2024-01-31").unwrap();
        assert_eq!(
            to_db_timestamp(&range.start_time()),
            "2024-01-01 00:00:00.000000"
        );
        assert_eq!(
            to_db_timestamp(&range.end_time_exclusive()),
            "2024-02-01 00:00:00.000000"
        );
        let (first, last) = range.metric_time_bounds();
        assert_eq!(to_db_timestamp(&first), "2024-01-02 00:00:00.000000");
        assert_eq!(to_report_timestamp(&last), "2024-02-01 00:00:00");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = date("2024-01-15").and_hms_opt(10, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-15 10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-15T10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-15 10:30"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-15T12:30:00+02:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-01-15"),
            Some(date("2024-01-15").and_hms_opt(0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_timestamp("2024-01-15 10:30:00.250"),
            Some(date("2024-01-15").and_hms_milli_opt(10, 30, 0, 250).unwrap())
        );
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp("  "), None);
    }

    #[test]
    fn test_db_timestamp_round_trip() {
        let ts = date("2024-06-30").and_hms_micro_opt(23, 59, 59, 250_000).unwrap();
        assert_eq!(to_db_timestamp(&ts), "2024-06-30 23:59:59.250000");
        assert_eq!(parse_db_timestamp(&to_db_timestamp(&ts)).unwrap(), ts);
        assert_eq!(
            parse_db_timestamp("2024-06-30 23:59:59").unwrap(),
            date("2024-06-30").and_hms_opt(23, 59, 59).unwrap()
        );
    }

    #[test]
    fn test_db_timestamps_sort_chronologically_as_text() {
        let earlier = date("2024-01-15").and_hms_micro_opt(10, 30, 0, 750_000).unwrap();
        let later = date("2024-01-15").and_hms_opt(10, 30, 1).unwrap();
        assert!(to_db_timestamp(&earlier) < to_db_timestamp(&later));
    }

    #[test]
    fn test_count_metric_name() {
        assert_eq!(count_metric_name("login"), "count_login");
    }
}
