//! churnlens-metric-qa - metric coverage and metric-over-time reports

mod common;

use anyhow::{Context, Result};
use churnlens_core::analytics::qa::{
    metric_coverage, metric_stats_over_time, write_metric_coverage, write_metric_stats_over_time,
};
use churnlens_core::format::{format_count, format_percent};
use clap::Parser;
use common::{DbArgs, OutputFormat, RangeArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "churnlens-metric-qa")]
#[command(about = "Check metric coverage and metric values over time")]
#[command(version)]
struct Args {
    #[command(flatten)]
    range: RangeArgs,

    /// Metric to chart over time (default: first metric in the coverage report)
    #[arg(long)]
    metric: Option<String>,

    /// Directory for report files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(flatten)]
    db: DbArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (config, _log_guard) = common::init(&args.db)?;
    let range = args.range.range()?;
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.pipeline.output_dir.clone());

    tracing::info!(range = %range, metric = ?args.metric, "Starting metric QA");
    let db = common::open_database(&config)?;

    let coverage = metric_coverage(&db, &range).context("failed to compute metric coverage")?;
    let coverage_path =
        write_metric_coverage(&output_dir, &coverage).context("failed to write coverage report")?;

    let metric = args
        .metric
        .clone()
        .or_else(|| coverage.first().map(|c| c.metric_name.clone()));

    let series = match &metric {
        Some(metric) => {
            let series = metric_stats_over_time(&db, metric, &range)
                .with_context(|| format!("failed to compute {} over time", metric))?;
            let path = write_metric_stats_over_time(&output_dir, metric, &series)
                .context("failed to write metric series")?;
            Some((metric.clone(), series, path))
        }
        None => None,
    };

    db.close().context("failed to close database")?;

    match args.format {
        OutputFormat::Json => common::print_json(&serde_json::json!({
            "range": range,
            "coverage": coverage,
            "coverage_report": coverage_path,
            "over_time": series.as_ref().map(|(metric, points, path)| serde_json::json!({
                "metric": metric,
                "points": points,
                "report": path,
            })),
        }))?,
        OutputFormat::Text => {
            if coverage.is_empty() {
                println!("No metrics found for {}.", range);
                println!("Run 'churnlens-metrics' first.");
            } else {
                println!(
                    "{:<36} {:>10} {:>9} {:>10} {:>10}",
                    "METRIC", "ACCOUNTS", "COVERAGE", "AVG", "MAX"
                );
                for c in &coverage {
                    println!(
                        "{:<36} {:>10} {:>9} {:>10.2} {:>10}",
                        c.metric_name,
                        format_count(c.count_with_metric),
                        format_percent(c.pct_coverage),
                        c.avg_value,
                        c.max_value
                    );
                }
            }
            println!("Wrote {}", coverage_path.display());

            if let Some((metric, points, path)) = &series {
                println!();
                println!("{} over time: {} timestamps", metric, points.len());
                if let (Some(first), Some(last)) = (points.first(), points.last()) {
                    println!("  First: {} (avg {:.2}, n {})", first.metric_time, first.avg, first.n_calc);
                    println!("  Last:  {} (avg {:.2}, n {})", last.metric_time, last.avg, last.n_calc);
                }
                println!("Wrote {}", path.display());
            }
        }
    }

    Ok(())
}
