//! churnlens-metrics - compute per-account daily count metrics
//!
//! Without `--event-type`, computes `count_<type>` for every common event
//! type in the range. A failure for one type is reported and the rest still
//! run.

mod common;

use anyhow::{Context, Result};
use churnlens_core::analytics::{
    calculate_metrics_for_common_events, compute_count_metric, MetricRun, RecomputeMode,
};
use churnlens_core::count_metric_name;
use churnlens_core::format::format_count;
use clap::Parser;
use common::{DbArgs, OutputFormat, RangeArgs};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "churnlens-metrics")]
#[command(about = "Calculate count metrics for common event types")]
#[command(version)]
struct Args {
    #[command(flatten)]
    range: RangeArgs,

    /// Events per account per month an event type must exceed to be common
    #[arg(long)]
    min_events_per_month: Option<f64>,

    /// Compute a single event type instead of all common ones
    #[arg(long)]
    event_type: Option<String>,

    /// Metric name for --event-type (default: count_<event type>)
    #[arg(long, requires = "event_type")]
    metric_name: Option<String>,

    /// Replace stored values in the range instead of keeping them
    #[arg(long)]
    overwrite: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(flatten)]
    db: DbArgs,
}

#[derive(Serialize)]
struct Failure {
    event_type: String,
    error: String,
}

#[derive(Serialize)]
struct Report {
    succeeded: Vec<MetricRun>,
    failed: Vec<Failure>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (config, _log_guard) = common::init(&args.db)?;
    let range = args.range.range()?;
    let mode = if args.overwrite {
        RecomputeMode::Overwrite
    } else {
        RecomputeMode::KeepExisting
    };

    tracing::info!(range = %range, ?mode, event_type = ?args.event_type, "Starting metric calculation");
    let db = common::open_database(&config)?;

    let report = match &args.event_type {
        Some(event_type) => {
            let metric_name = args
                .metric_name
                .clone()
                .unwrap_or_else(|| count_metric_name(event_type));
            let run = compute_count_metric(&db, event_type, &metric_name, &range, mode)
                .with_context(|| format!("failed to compute {}", metric_name))?;
            Report {
                succeeded: vec![run],
                failed: Vec::new(),
            }
        }
        None => {
            let threshold = args
                .min_events_per_month
                .unwrap_or(config.pipeline.min_events_per_month);
            let result = calculate_metrics_for_common_events(&db, &range, threshold, mode)
                .context("failed to select common events")?;
            Report {
                succeeded: result.succeeded,
                failed: result
                    .failed
                    .into_iter()
                    .map(|f| Failure {
                        event_type: f.item,
                        error: f.error.to_string(),
                    })
                    .collect(),
            }
        }
    };

    db.close().context("failed to close database")?;

    match args.format {
        OutputFormat::Json => common::print_json(&report)?,
        OutputFormat::Text => {
            if report.succeeded.is_empty() && report.failed.is_empty() {
                println!("No common event types in {}.", range);
                println!("Run 'churnlens-load' first, or lower --min-events-per-month.");
            }
            for run in &report.succeeded {
                println!(
                    "{:<40} {:>10} new {:>12} total",
                    run.metric_name,
                    format_count(run.rows_inserted as i64),
                    format_count(run.total_rows)
                );
            }
            for failure in &report.failed {
                eprintln!("FAILED {}: {}", failure.event_type, failure.error);
            }
            println!();
            println!(
                "{} of {} metrics calculated for {}.",
                report.succeeded.len(),
                report.succeeded.len() + report.failed.len(),
                range
            );
        }
    }

    Ok(())
}
