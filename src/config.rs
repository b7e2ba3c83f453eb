//! Archive configuration.
//!
//! A configuration is a JSON document describing one source/destination pair:
//!
//! ```json
//! {
//!     "src": "/data/incoming",
//!     "dst": "/archive/incoming",
//!     "filters": {"type": "file", "secondsSinceModified__gt": 86400},
//!     "exclude": ["*.lock", "/data/incoming/keep"],
//!     "copy_meta": true,
//!     "log_file": "/var/log/auto-archive-files/incoming.log",
//!     "on_fail": ["/usr/local/bin/send-alert", "--to", "ops"],
//!     "env": {"ALERT_TOKEN": "..."}
//! }
//! ```
//!
//! The command line names either the file itself or a short name that is
//! resolved to `<config dir>/<name>.json`.

use crate::entry::Entry;
use crate::filter::{FilterError, FilterSpec};
use glob::Pattern;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory searched for `<name>.json` when the argument is not a path.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/auto-archive-files";

/// Errors that can occur while loading and validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// None of the candidate files exist.
    #[error("configuration '{name}' not found (tried {})", display_paths(.candidates))]
    ConfigNotFound {
        name: String,
        candidates: Vec<PathBuf>,
    },
    /// The file exists but could not be read.
    #[error("cannot read configuration {}: {source}", .path.display())]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The document is not valid JSON or has the wrong shape.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    /// `src` and `dst` do not describe two separate absolute trees.
    #[error("invalid roots: {0}")]
    InvalidRoots(String),
    /// A filter key or value was rejected.
    #[error(transparent)]
    InvalidFilter(#[from] FilterError),
    /// An exclude entry is not a valid glob pattern.
    #[error("invalid exclude pattern '{pattern}': {reason}")]
    InvalidGlobPattern { pattern: String, reason: String },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One archive job as read from disk.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Root of the tree to scan.
    pub src: PathBuf,

    /// Root of the tree entries are copied into.
    pub dst: PathBuf,

    /// Filter specification selecting entries to archive.
    #[serde(default)]
    pub filters: Map<String, Value>,

    /// Glob patterns of entries to leave alone even if they match.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Preserve permissions and timestamps when copying.
    #[serde(default)]
    pub copy_meta: bool,

    /// Plain-text log destination. Empty or missing disables file logging.
    #[serde(default, deserialize_with = "empty_path_as_none")]
    pub log_file: Option<PathBuf>,

    /// Command prefix run when an entry fails.
    #[serde(default)]
    pub on_fail: Vec<String>,

    /// Environment for the failure command.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn empty_path_as_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(PathBuf::from))
}

impl ArchiveConfig {
    /// Loads a configuration by path or by name.
    ///
    /// `name_or_path` is tried as given first, then as
    /// `<config_dir>/<name_or_path>.json`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if no candidate exists, and the
    /// errors of [`ArchiveConfig::from_file`] otherwise.
    pub fn load(name_or_path: &str, config_dir: &Path) -> Result<Self, ConfigError> {
        let candidates = Self::candidates(name_or_path, config_dir);
        match candidates.iter().find(|c| c.is_file()) {
            Some(path) => Self::from_file(path),
            None => Err(ConfigError::ConfigNotFound {
                name: name_or_path.to_string(),
                candidates,
            }),
        }
    }

    /// The paths [`ArchiveConfig::load`] tries, in order.
    pub fn candidates(name_or_path: &str, config_dir: &Path) -> Vec<PathBuf> {
        vec![
            PathBuf::from(name_or_path),
            config_dir.join(format!("{}.json", name_or_path)),
        ]
    }

    /// Reads and parses a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&content)
    }

    /// Parses a configuration from JSON text.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Checks that `src` and `dst` are absolute, distinct, and that the
    /// archive does not live inside the tree being scanned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.src.is_absolute() {
            return Err(ConfigError::InvalidRoots(format!(
                "src must be an absolute path, got {}",
                self.src.display()
            )));
        }
        if !self.dst.is_absolute() {
            return Err(ConfigError::InvalidRoots(format!(
                "dst must be an absolute path, got {}",
                self.dst.display()
            )));
        }
        if self.dst.starts_with(&self.src) {
            return Err(ConfigError::InvalidRoots(format!(
                "dst {} must not be src or lie inside it",
                self.dst.display()
            )));
        }
        Ok(())
    }

    /// Validates the configuration and compiles its filters and exclusions.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid roots, filter keys, filter values or
    /// exclude patterns.
    pub fn compile(&self) -> Result<CompiledRules, ConfigError> {
        self.validate()?;
        Ok(CompiledRules {
            filters: FilterSpec::compile(&self.filters)?,
            exclude: ExcludeRules::new(&self.src, &self.exclude)?,
        })
    }
}

/// Filters and exclusions ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub filters: FilterSpec,
    pub exclude: ExcludeRules,
}

/// Compiled `exclude` patterns.
///
/// A pattern excludes an entry when it matches either the entry's absolute
/// path or its path relative to the source root. A plain path without glob
/// metacharacters therefore excludes exactly that entry. Only the entry
/// itself is excluded, not the contents of an excluded directory.
#[derive(Debug, Clone, Default)]
pub struct ExcludeRules {
    src: PathBuf,
    patterns: Vec<Pattern>,
}

impl ExcludeRules {
    /// Compiles the patterns, relative to the source root `src`.
    pub fn new(src: &Path, patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| ConfigError::InvalidGlobPattern {
                    pattern: pattern.clone(),
                    reason: e.msg.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            src: src.to_path_buf(),
            patterns,
        })
    }

    /// True if any pattern matches the entry.
    pub fn is_excluded(&self, entry: &Entry) -> bool {
        let absolute = entry.path();
        let relative = absolute.strip_prefix(&self.src).ok();
        self.patterns.iter().any(|pattern| {
            pattern.matches_path(absolute) || relative.is_some_and(|r| pattern.matches_path(r))
        })
    }
}
