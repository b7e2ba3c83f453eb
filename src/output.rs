//! Output formatting and styling module.
//!
//! Human-facing console output for the command line: the dry-run listing and
//! the end-of-run summary. Diagnostics go through `tracing` instead.

use crate::archiver::{ArchiveReport, PlannedMove};
use chrono::{DateTime, Local};
use colored::*;

/// Manages CLI output with consistent styling.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use auto_archive_files::output::OutputFormatter;
    /// OutputFormatter::error("configuration 'nightly' not found");
    /// ```
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Lists the moves a dry run found.
    pub fn planned_moves(moves: &[PlannedMove]) {
        if moves.is_empty() {
            Self::dry_run_notice("Nothing to archive.");
            return;
        }

        Self::dry_run_notice(&format!(
            "{} {} would be archived:",
            moves.len(),
            if moves.len() == 1 { "entry" } else { "entries" }
        ));
        for planned in moves {
            let kind = planned.entry_type.map(|t| t.as_str()).unwrap_or("entry");
            let modified = planned
                .modified_at
                .and_then(format_timestamp)
                .unwrap_or_else(|| "unknown".to_string());
            println!(" - {} [{}, modified {}]", planned.source.display(), kind, modified);
            println!("   → {}", planned.destination.display().to_string().cyan());
        }
    }

    /// Prints the outcome of an archive run.
    pub fn summary(report: &ArchiveReport) {
        Self::header("SUMMARY");

        let rows = [
            ("Moved", report.moved.len()),
            ("Failed", report.failures.len()),
            ("Pruned dirs", report.pruned.len()),
            ("Skipped", report.skipped.len()),
        ];
        let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);

        for (label, count) in rows {
            let count = if label == "Failed" && count > 0 {
                count.to_string().red().bold()
            } else {
                count.to_string().green()
            };
            println!("{:<width$} | {}", label, count, width = width);
        }

        if !report.failures.is_empty() {
            Self::header("FAILURES");
            for (path, err) in &report.failures {
                Self::error(&format!("{} ({}): {}", path.display(), err.step(), err));
            }
        }

        println!();
        if report.is_complete_success() {
            Self::success("Archive run complete.");
        } else {
            Self::warning("Archive run complete with failures. See the log for details.");
        }
    }
}

fn format_timestamp(secs: f64) -> Option<String> {
    let utc = DateTime::from_timestamp(secs.floor() as i64, 0)?;
    Some(
        utc.with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        let formatted = format_timestamp(0.0).unwrap();
        assert_eq!(formatted.len(), "1970-01-01 00:00:00".len());
        assert!(format_timestamp(f64::MAX).is_none());
    }
}
