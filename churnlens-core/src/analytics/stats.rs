//! Summary statistics over a wide dataset
//!
//! One row per feature column: count, nonzero percentage, mean, standard
//! deviation, skewness, min, 1/25/50/75/99th percentiles and max.
//!
//! Missing values (NaN) are left out of every statistic except the nonzero
//! percentage, which divides by the number of rows and treats a missing
//! value as engaged, the way a boolean cast of NaN is true.

use super::dataset::CustomerDataset;
use crate::error::Result;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Percentiles reported for every column.
pub const PERCENTILES: [f64; 5] = [0.01, 0.25, 0.50, 0.75, 0.99];

/// Linear-interpolated quantile of sorted, NaN-free values.
///
/// Uses position `h = (n - 1) q` between the surrounding order statistics.
/// Returns NaN for empty input.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lower = h.floor() as usize;
    let upper = h.ceil() as usize;
    sorted[lower] + (h - lower as f64) * (sorted[upper] - sorted[lower])
}

/// Sample standard deviation (n - 1 denominator); NaN below two values.
pub fn std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Adjusted Fisher-Pearson sample skewness `G1`.
///
/// NaN below three values; zero when every value is equal.
pub fn skew(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return f64::NAN;
    }
    let nf = n as f64;
    let mean = values.iter().sum::<f64>() / nf;
    let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / nf;
    let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / nf;
    if m2 == 0.0 {
        return 0.0;
    }
    let g1 = m3 / m2.powf(1.5);
    (nf * (nf - 1.0)).sqrt() / (nf - 2.0) * g1
}

/// Statistics for one column. `None` fields are undefined for the data (written empty).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub metric: String,
    pub count: usize,
    pub nonzero: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub skew: Option<f64>,
    pub min: Option<f64>,
    #[serde(rename = "1pct")]
    pub pct1: Option<f64>,
    #[serde(rename = "25pct")]
    pub pct25: Option<f64>,
    #[serde(rename = "50pct")]
    pub pct50: Option<f64>,
    #[serde(rename = "75pct")]
    pub pct75: Option<f64>,
    #[serde(rename = "99pct")]
    pub pct99: Option<f64>,
    pub max: Option<f64>,
}

fn defined(value: f64) -> Option<f64> {
    (!value.is_nan()).then_some(value)
}

impl SummaryRow {
    /// Summarize one column of values; NaN marks a missing value.
    pub fn from_values(metric: &str, values: &[f64]) -> Self {
        let rows = values.len();
        let engaged = values.iter().filter(|v| **v != 0.0).count();

        let mut present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let n = present.len();

        let mean = if n > 0 {
            present.iter().sum::<f64>() / n as f64
        } else {
            f64::NAN
        };
        let [p1, p25, p50, p75, p99] = PERCENTILES.map(|q| defined(quantile(&present, q)));

        Self {
            metric: metric.to_string(),
            count: n,
            nonzero: (rows > 0).then(|| engaged as f64 / rows as f64 * 100.0),
            mean: defined(mean),
            std: defined(std_dev(&present)),
            skew: defined(skew(&present)),
            min: present.first().copied(),
            pct1: p1,
            pct25: p25,
            pct50: p50,
            pct75: p75,
            pct99: p99,
            max: present.last().copied(),
        }
    }
}

/// Per-column statistics for a dataset, in column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub rows: Vec<SummaryRow>,
}

impl SummaryReport {
    /// Row for a named column
    pub fn get(&self, metric: &str) -> Option<&SummaryRow> {
        self.rows.iter().find(|r| r.metric == metric)
    }

    /// Write the report as CSV
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        super::write_csv_rows(path, &self.rows)
    }
}

/// Summarize every metric column of a dataset.
pub fn summarize(dataset: &CustomerDataset) -> SummaryReport {
    let rows = dataset
        .metric_names
        .iter()
        .enumerate()
        .map(|(i, name)| SummaryRow::from_values(name, &dataset.column(i)))
        .collect();
    SummaryReport { rows }
}

/// Companion file for a dataset: `<stem>_summarystats.csv` in the same directory.
pub fn summary_path(dataset_path: &Path) -> PathBuf {
    let stem = dataset_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    dataset_path.with_file_name(format!("{}_summarystats.csv", stem))
}

/// Load a persisted dataset, summarize it and write the companion stats file.
pub fn dataset_stats(dataset_path: &Path) -> Result<(SummaryReport, PathBuf)> {
    let dataset = CustomerDataset::read_csv(dataset_path)?;
    let report = summarize(&dataset);
    let path = summary_path(dataset_path);
    report.write_csv(&path)?;

    tracing::info!(
        dataset = %dataset_path.display(),
        summary = %path.display(),
        columns = report.rows.len(),
        "Wrote summary statistics"
    );
    Ok((report, path))
}
