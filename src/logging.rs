//! Process-wide logging setup.
//!
//! Log lines go to stderr and, when the configuration names a log file, are
//! appended to that file as well. The level comes from the command line and
//! can be refined per module through `RUST_LOG`.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot open log file {}: {source}", .path.display())]
    LogFileFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("logging is already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if the log file cannot be opened for appending or if a subscriber
/// was already installed.
pub fn init(level: LevelFilter, log_file: Option<&Path>) -> Result<(), LoggingError> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| LoggingError::LogFileFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()?;

    Ok(())
}
