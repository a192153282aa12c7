//! churnlens-events - event frequency QA
//!
//! Writes the per-account-per-month frequency table for every event type,
//! reports how many types clear the common-event threshold, and optionally
//! writes daily series for chosen event types.

mod common;

use anyhow::{Context, Result};
use churnlens_core::analytics::events::{
    events_per_account, events_per_day, write_events_per_account, write_events_per_day,
    DailyEventSummary, ThresholdSummary,
};
use churnlens_core::format::{format_count, format_percent};
use clap::Parser;
use common::{DbArgs, OutputFormat, RangeArgs};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "churnlens-events")]
#[command(about = "Report event frequencies and daily event series")]
#[command(version)]
struct Args {
    #[command(flatten)]
    range: RangeArgs,

    /// Events per account per month an event type must exceed to be common
    #[arg(long)]
    min_events_per_month: Option<f64>,

    /// Event type to write a daily series for (repeatable)
    #[arg(long = "event-type")]
    event_types: Vec<String>,

    /// Directory for report files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(flatten)]
    db: DbArgs,
}

#[derive(Serialize)]
struct DailyReport {
    event_type: String,
    file: PathBuf,
    summary: Option<DailyEventSummary>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (config, _log_guard) = common::init(&args.db)?;
    let range = args.range.range()?;
    let threshold = args
        .min_events_per_month
        .unwrap_or(config.pipeline.min_events_per_month);
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.pipeline.output_dir.clone());

    tracing::info!(range = %range, threshold, "Starting event frequency report");
    let db = common::open_database(&config)?;

    let frequencies = events_per_account(&db, &range).context("failed to compute event frequencies")?;
    let summary = ThresholdSummary::new(&frequencies, threshold);
    let table_path = write_events_per_account(&output_dir, &frequencies)
        .context("failed to write event frequency report")?;

    let mut daily = Vec::new();
    for event_type in &args.event_types {
        let series = events_per_day(&db, event_type, &range)
            .with_context(|| format!("failed to compute daily events for {}", event_type))?;
        let file = write_events_per_day(&output_dir, event_type, &series)
            .context("failed to write daily event report")?;
        daily.push(DailyReport {
            event_type: event_type.clone(),
            file,
            summary: DailyEventSummary::from_series(&series),
        });
    }

    db.close().context("failed to close database")?;

    match args.format {
        OutputFormat::Json => common::print_json(&serde_json::json!({
            "range": range,
            "frequencies": frequencies,
            "threshold": summary,
            "report": table_path,
            "daily": daily,
        }))?,
        OutputFormat::Text => {
            println!("Event frequencies {} ({:.2} months)", range, range.months());
            println!();
            println!(
                "{:<30} {:>12} {:>10} {:>14}",
                "EVENT TYPE", "EVENTS", "ACCOUNTS", "PER ACCT/MONTH"
            );
            for f in &frequencies {
                println!(
                    "{:<30} {:>12} {:>10} {:>14.4}",
                    f.event_type_name,
                    format_count(f.n_event),
                    format_count(f.n_account),
                    f.events_per_account_per_month
                );
            }
            println!();
            println!(
                "{} of {} event types ({}) exceed {} events per account per month.",
                summary.above,
                summary.total,
                format_percent(summary.percent_above),
                threshold
            );
            println!("Wrote {}", table_path.display());

            for report in &daily {
                println!();
                println!("Daily events: {}", report.event_type);
                match &report.summary {
                    Some(s) => {
                        println!("  Days:              {} ({} to {})", s.days, s.first_day, s.last_day);
                        println!("  Days with events:  {}", s.days_with_events);
                        println!("  Zero days:         {} (longest run {})", s.zero_days, s.longest_zero_run);
                        println!("  Per day:           mean {:.2}, median {}, min {}, max {}", s.mean, s.median, s.min, s.max);
                        if !s.outlier_days.is_empty() {
                            let days: Vec<String> =
                                s.outlier_days.iter().map(|d| d.to_string()).collect();
                            println!("  Outlier days:      {}", days.join(", "));
                        }
                    }
                    None => println!("  No days in range"),
                }
                println!("  Wrote {}", report.file.display());
            }
        }
    }

    Ok(())
}
