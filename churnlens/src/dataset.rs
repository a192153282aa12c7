//! churnlens-dataset - build the current customer dataset and its summary statistics
//!
//! Pivots the metrics at the latest metric time into one row per active
//! account, writes it as CSV and writes `<name>_summarystats.csv` next to
//! it. With `--stats-only`, summarizes an existing dataset file instead.

mod common;

use anyhow::{Context, Result};
use churnlens_core::analytics::{create_current_dataset, dataset_stats, SummaryReport};
use churnlens_core::format::{format_count, format_percent, format_stat};
use clap::Parser;
use common::{DbArgs, OutputFormat};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "churnlens-dataset")]
#[command(about = "Assemble the current customer dataset and summary statistics")]
#[command(version)]
struct Args {
    /// Directory for the dataset and statistics files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Dataset file name
    #[arg(long, default_value = "churn_dataset.csv")]
    file_name: String,

    /// Days before the latest metric time an account needs an event in
    #[arg(long)]
    active_window_days: Option<i64>,

    /// Summarize an existing dataset file without touching the database
    #[arg(long, value_name = "DATASET")]
    stats_only: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(flatten)]
    db: DbArgs,
}

#[derive(Serialize)]
struct Report {
    dataset: PathBuf,
    accounts: Option<usize>,
    summary_file: PathBuf,
    summary: SummaryReport,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (config, _log_guard) = common::init(&args.db)?;

    let (dataset_path, accounts) = match &args.stats_only {
        Some(path) => (path.clone(), None),
        None => {
            let window = args
                .active_window_days
                .unwrap_or(config.pipeline.active_window_days);
            anyhow::ensure!(window >= 0, "--active-window-days must not be negative");

            let output_dir = args
                .output_dir
                .clone()
                .unwrap_or_else(|| config.pipeline.output_dir.clone());
            let path = output_dir.join(&args.file_name);

            tracing::info!(path = %path.display(), window, "Building current dataset");
            let db = common::open_database(&config)?;
            let dataset = create_current_dataset(&db, window)
                .context("failed to assemble current dataset")?;
            db.close().context("failed to close database")?;

            dataset
                .write_csv(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            (path, Some(dataset.len()))
        }
    };

    let (summary, summary_file) = dataset_stats(&dataset_path)
        .with_context(|| format!("failed to summarize {}", dataset_path.display()))?;

    let report = Report {
        dataset: dataset_path,
        accounts,
        summary_file,
        summary,
    };

    match args.format {
        OutputFormat::Json => common::print_json(&report)?,
        OutputFormat::Text => {
            if let Some(accounts) = report.accounts {
                println!(
                    "Wrote {} ({} accounts)",
                    report.dataset.display(),
                    format_count(accounts as i64)
                );
            }
            println!();
            println!(
                "{:<32} {:>8} {:>8} {:>10} {:>10} {:>8} {:>8} {:>8} {:>8}",
                "METRIC", "COUNT", "NONZERO", "MEAN", "STD", "SKEW", "MIN", "50PCT", "MAX"
            );
            for row in &report.summary.rows {
                println!(
                    "{:<32} {:>8} {:>8} {:>10} {:>10} {:>8} {:>8} {:>8} {:>8}",
                    row.metric,
                    format_count(row.count as i64),
                    row.nonzero.map(format_percent).unwrap_or_else(|| "-".to_string()),
                    format_stat(row.mean),
                    format_stat(row.std),
                    format_stat(row.skew),
                    format_stat(row.min),
                    format_stat(row.pct50),
                    format_stat(row.max),
                );
            }
            println!();
            println!("Wrote {}", report.summary_file.display());
        }
    }

    Ok(())
}
