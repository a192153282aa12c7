//! churnlens-load - load an event CSV into the event store
//!
//! Creates the event tables if needed and inserts every event, skipping
//! rows already present. Safe to re-run over the same file.

mod common;

use anyhow::{Context, Result};
use churnlens_core::format::format_count;
use churnlens_core::ingest::{load_csv_with_progress, LoadOptions};
use clap::Parser;
use common::{DbArgs, OutputFormat};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "churnlens-load")]
#[command(about = "Load event CSV data into the churnlens event store")]
#[command(version)]
struct Args {
    /// CSV file with account_id, event_time, event_type columns
    csv: PathBuf,

    /// Rows per insert transaction
    #[arg(long)]
    batch_size: Option<usize>,

    /// Rows read from the CSV at a time
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(flatten)]
    db: DbArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (config, _log_guard) = common::init(&args.db)?;

    let mut options = LoadOptions::from(&config.pipeline);
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
    }
    if let Some(chunk_size) = args.chunk_size {
        options.chunk_size = chunk_size;
    }

    tracing::info!(
        csv = %args.csv.display(),
        batch_size = options.batch_size,
        chunk_size = options.chunk_size,
        "Starting event load"
    );
    let db = common::open_database(&config)?;

    let pb = if args.format == OutputFormat::Text {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Loading {}", args.csv.display()));
        pb
    } else {
        ProgressBar::hidden()
    };

    let result = load_csv_with_progress(&args.csv, &db, &options, |progress| {
        pb.set_message(format!(
            "{} rows submitted, {} inserted",
            format_count(progress.rows_submitted as i64),
            format_count(progress.rows_inserted as i64)
        ));
    })
    .with_context(|| format!("failed to load {}", args.csv.display()))?;
    pb.finish_and_clear();

    db.close().context("failed to close database")?;

    match args.format {
        OutputFormat::Json => common::print_json(&result)?,
        OutputFormat::Text => {
            println!("Loaded {}", args.csv.display());
            println!("  Rows read:        {}", format_count(result.rows_read as i64));
            println!("  Rows skipped:     {}", format_count(result.rows_skipped as i64));
            println!("  Rows inserted:    {}", format_count(result.rows_inserted as i64));
            println!(
                "  Duplicates:       {}",
                format_count((result.rows_submitted - result.rows_inserted) as i64)
            );
            println!(
                "  Event types:      {} ({} new)",
                result.event_kinds, result.event_kinds_inserted
            );
            println!();
            println!(
                "Store now holds {} events of {} types.",
                format_count(result.total_events),
                format_count(result.total_event_kinds)
            );
        }
    }

    Ok(())
}
