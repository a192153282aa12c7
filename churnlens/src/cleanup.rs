//! churnlens-cleanup - reset the pipeline
//!
//! Drops every pipeline table and removes report files from the output
//! directory. Asks for confirmation unless `--yes` is given.

mod common;

use anyhow::{Context, Result};
use churnlens_core::cleanup::{cleanup_all, CleanupOutcome, StdinConfirm};
use clap::Parser;
use common::DbArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "churnlens-cleanup")]
#[command(about = "Drop all churnlens tables and remove generated reports")]
#[command(version)]
struct Args {
    /// Only drop database tables
    #[arg(long, conflicts_with = "output_only")]
    db_only: bool,

    /// Only remove output files
    #[arg(long)]
    output_only: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    yes: bool,

    /// Output directory to clean
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[command(flatten)]
    db: DbArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (config, _log_guard) = common::init(&args.db)?;
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.pipeline.output_dir.clone());

    tracing::info!(
        db_only = args.db_only,
        output_only = args.output_only,
        assume_yes = args.yes,
        "Starting cleanup"
    );
    let db = if args.output_only {
        None
    } else {
        Some(common::open_database(&config)?)
    };
    let output = (!args.db_only).then_some(output_dir.as_path());

    let outcome = cleanup_all(db.as_ref(), output, &mut StdinConfirm, args.yes)
        .context("cleanup failed")?;

    if let Some(db) = db {
        db.close().context("failed to close database")?;
    }

    match outcome {
        CleanupOutcome::Cancelled => println!("Cleanup cancelled."),
        CleanupOutcome::Completed {
            dropped_tables,
            output,
        } => {
            for table in &dropped_tables {
                println!("Dropped table {}", table.as_str());
            }
            for path in &output.removed_files {
                println!("Removed {}", path.display());
            }
            if output.removed_dir {
                println!("Removed empty directory {}", output_dir.display());
            }
            println!(
                "Cleanup complete: {} tables dropped, {} files removed.",
                dropped_tables.len(),
                output.removed_files.len()
            );
        }
    }

    Ok(())
}
