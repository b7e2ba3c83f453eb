//! Command-line interface module.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing and verbosity selection
//! - Configuration loading and name resolution
//! - Logging setup
//! - Dry-run listing and archive orchestration

use crate::archiver::Archiver;
use crate::config::{ArchiveConfig, DEFAULT_CONFIG_DIR};
use crate::logging;
use crate::output::OutputFormatter;
use clap::{Args, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;

/// Move files matching age and type filters into an archive tree.
#[derive(Debug, Parser)]
#[command(name = "auto-archive-files", version, about)]
pub struct Cli {
    /// Configuration file path, or a name resolved as <CONFIG_DIR>/<name>.json.
    pub config: String,

    /// Directory holding named configurations.
    #[arg(long, env = "AUTO_ARCHIVE_FILES_CONFIG_DIR", default_value = DEFAULT_CONFIG_DIR)]
    pub config_dir: PathBuf,

    /// Show what would be archived without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

/// Logging threshold flags. At most one may be given.
#[derive(Debug, Clone, Copy, Default, Args)]
#[group(multiple = false)]
pub struct Verbosity {
    /// Set logging to WARNING.
    #[arg(long)]
    pub warning: bool,
    /// Set logging to ERROR.
    #[arg(long)]
    pub quiet: bool,
    /// Set logging to DEBUG.
    #[arg(long)]
    pub debug: bool,
    /// Set logging to TRACE, including per-node traversal.
    #[arg(long)]
    pub verbose: bool,
}

impl Verbosity {
    /// The selected level; INFO when no flag is given.
    pub fn level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::TRACE
        } else if self.debug {
            LevelFilter::DEBUG
        } else if self.quiet {
            LevelFilter::ERROR
        } else if self.warning {
            LevelFilter::WARN
        } else {
            LevelFilter::INFO
        }
    }
}

/// Runs one invocation and maps the outcome to an exit code.
///
/// Exits with 0 once a pass has completed, even if individual entries
/// failed; those are reported in the summary and the log. Exits with 1 when
/// the configuration, the log file or the source root is unusable.
pub fn run_cli(cli: &Cli) -> ExitCode {
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            OutputFormatter::error(&message);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = ArchiveConfig::load(&cli.config, &cli.config_dir)
        .map_err(|e| format!("Error loading configuration: {}", e))?;
    let archiver =
        Archiver::new(config).map_err(|e| format!("Error in configuration: {}", e))?;

    logging::init(
        cli.verbosity.level(),
        archiver.config().log_file.as_deref(),
    )
    .map_err(|e| format!("Error setting up logging: {}", e))?;

    if cli.dry_run {
        let plan = archiver.plan().map_err(|e| e.to_string())?;
        OutputFormatter::planned_moves(&plan);
        return Ok(());
    }

    let report = archiver.archive().map_err(|e| e.to_string())?;
    OutputFormatter::summary(&report);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_level_is_info() {
        let cli = Cli::try_parse_from(["auto-archive-files", "nightly"]).unwrap();
        assert_eq!(cli.config, "nightly");
        assert_eq!(cli.verbosity.level(), LevelFilter::INFO);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_verbosity_flags() {
        for (flag, level) in [
            ("--warning", LevelFilter::WARN),
            ("--quiet", LevelFilter::ERROR),
            ("--debug", LevelFilter::DEBUG),
            ("--verbose", LevelFilter::TRACE),
        ] {
            let cli = Cli::try_parse_from(["auto-archive-files", flag, "job"]).unwrap();
            assert_eq!(cli.verbosity.level(), level, "{}", flag);
        }
    }

    #[test]
    fn test_verbosity_flags_conflict() {
        assert!(Cli::try_parse_from(["auto-archive-files", "--quiet", "--debug", "job"]).is_err());
    }

    #[test]
    fn test_config_argument_required() {
        assert!(Cli::try_parse_from(["auto-archive-files"]).is_err());
    }

    #[test]
    fn test_config_dir_flag() {
        let cli = Cli::try_parse_from([
            "auto-archive-files",
            "--config-dir",
            "/srv/archive-jobs",
            "--dry-run",
            "job",
        ])
        .unwrap();
        assert_eq!(cli.config_dir, PathBuf::from("/srv/archive-jobs"));
        assert!(cli.dry_run);
    }
}
