//! Full reset of pipeline state
//!
//! Drops every pipeline table and removes generated report files. A reset
//! cannot be undone, so [`cleanup_all`] asks for confirmation first unless
//! the caller passes `assume_yes`.

use crate::db::{Database, Table};
use crate::error::{Error, Result};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// File extensions removed from the output directory.
pub const OUTPUT_EXTENSIONS: [&str; 3] = ["csv", "png", "pdf"];

/// Asks the user whether to proceed.
pub trait Confirm {
    /// Show `prompt` and return the raw answer.
    fn ask(&mut self, prompt: &str) -> Result<String>;
}

/// Reads the answer from a line of standard input.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{} [y/N] ", prompt)?;
        stdout.flush()?;

        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        Ok(answer)
    }
}

/// Only `y` or `yes` (any case) count as agreement.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Drop all pipeline tables, dependents first.
pub fn cleanup_database(db: &Database) -> Result<Vec<Table>> {
    let dropped = db.drop_all_tables()?;
    tracing::info!(
        schema = db.schema().as_str(),
        dropped = dropped.len(),
        "Database cleanup complete"
    );
    Ok(dropped)
}

/// Files removed from an output directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutputCleanup {
    pub removed_files: Vec<PathBuf>,
    /// The directory itself was removed because it ended up empty
    pub removed_dir: bool,
}

/// Remove generated reports from `dir`, then `dir` itself if nothing else is left.
///
/// A missing directory is not an error.
pub fn cleanup_output_files(dir: &Path) -> Result<OutputCleanup> {
    let mut outcome = OutputCleanup::default();
    if !dir.is_dir() {
        tracing::debug!(dir = %dir.display(), "Output directory does not exist");
        return Ok(outcome);
    }

    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    for ext in OUTPUT_EXTENSIONS {
        let pattern = format!("{}/*.{}", escaped, ext);
        let paths = glob::glob(&pattern)
            .map_err(|e| Error::InvalidInput(format!("bad output pattern {}: {}", pattern, e)))?;
        for entry in paths {
            let path = entry.map_err(|e| Error::Io(e.into_error()))?;
            if path.is_file() {
                std::fs::remove_file(&path)?;
                tracing::debug!(path = %path.display(), "Removed output file");
                outcome.removed_files.push(path);
            }
        }
    }

    if std::fs::read_dir(dir)?.next().is_none() {
        std::fs::remove_dir(dir)?;
        outcome.removed_dir = true;
    }

    tracing::info!(
        dir = %dir.display(),
        removed = outcome.removed_files.len(),
        removed_dir = outcome.removed_dir,
        "Output cleanup complete"
    );
    Ok(outcome)
}

/// Result of [`cleanup_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The user declined; nothing was touched
    Cancelled,
    Completed {
        dropped_tables: Vec<Table>,
        output: OutputCleanup,
    },
}

/// Reset the database and/or the output directory.
///
/// Pass `None` to leave a target alone.
pub fn cleanup_all(
    db: Option<&Database>,
    output_dir: Option<&Path>,
    confirm: &mut dyn Confirm,
    assume_yes: bool,
) -> Result<CleanupOutcome> {
    if !assume_yes {
        let mut targets = Vec::new();
        if let Some(db) = db {
            targets.push(format!("all tables in schema {}", db.schema()));
        }
        if let Some(dir) = output_dir {
            targets.push(format!("report files in {}", dir.display()));
        }
        let prompt = format!("This will permanently delete {}. Continue?", targets.join(" and "));

        let answer = confirm.ask(&prompt)?;
        if !is_affirmative(&answer) {
            tracing::info!("Cleanup cancelled");
            return Ok(CleanupOutcome::Cancelled);
        }
    }

    let dropped_tables = match db {
        Some(db) => cleanup_database(db)?,
        None => Vec::new(),
    };
    let output = match output_dir {
        Some(dir) => cleanup_output_files(dir)?,
        None => OutputCleanup::default(),
    };

    Ok(CleanupOutcome::Completed {
        dropped_tables,
        output,
    })
}
