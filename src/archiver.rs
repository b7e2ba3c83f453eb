//! The archive pipeline.
//!
//! Every selected entry goes through the same steps:
//!
//! 1. create the destination's parent directory;
//! 2. copy the entry to the destination;
//! 3. remove the source;
//! 4. prune the source's ancestors that are now empty, up to the source root.
//!
//! A failing step is logged, reported to the notification command if one is
//! configured, and ends processing of that entry only. The source is never
//! removed unless the copy succeeded. Nothing is retried.
//!
//! A directory is only moved once it is empty. Anything still inside it when
//! its turn comes was excluded, rejected by the filters or failed, so the
//! directory is left in place and reported as skipped.

use crate::config::{ArchiveConfig, CompiledRules, ConfigError};
use crate::entry::{Entry, EntryType};
use crate::filter::Predicate;
use crate::notify::Notifier;
use crate::prune::prune_empty_dirs;
use crate::selector::select_entries;
use crate::transfer::{FileTransfer, TransferError};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Child;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors that stop a whole run.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The source root could not be listed.
    #[error("cannot scan source directory {}: {source}", .path.display())]
    SourceUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// An entry that would be moved, as reported by a dry run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub entry_type: Option<EntryType>,
    /// Last modification, seconds since the epoch.
    pub modified_at: Option<f64>,
}

/// Outcome of one archive run.
#[derive(Debug, Default)]
pub struct ArchiveReport {
    /// Entries copied and removed from the source, as `(source, destination)`.
    pub moved: Vec<(PathBuf, PathBuf)>,
    /// Failed steps, keyed by the entry being processed.
    pub failures: Vec<(PathBuf, TransferError)>,
    /// Source directories removed because they were left empty.
    pub pruned: Vec<PathBuf>,
    /// Selected entries left alone: directories pruning had already removed,
    /// and directories still holding entries that were not archived.
    pub skipped: Vec<PathBuf>,
}

impl ArchiveReport {
    /// Number of selected entries handled in this run.
    ///
    /// An entry that was moved but whose pruning failed is counted once.
    pub fn total_processed(&self) -> usize {
        let moved: HashSet<&Path> = self.moved.iter().map(|(s, _)| s.as_path()).collect();
        let failed_unmoved = self
            .failures
            .iter()
            .filter(|(path, _)| !moved.contains(path.as_path()))
            .count();
        self.moved.len() + failed_unmoved + self.skipped.len()
    }

    /// True if no step failed.
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures of a given step (`makedirs`, `copy`, `remove`, `prune`).
    pub fn failures_of(&self, step: &str) -> impl Iterator<Item = &(PathBuf, TransferError)> {
        self.failures.iter().filter(move |(_, e)| e.step() == step)
    }
}

/// State carried through one archive pass.
#[derive(Default)]
struct Pass {
    report: ArchiveReport,
    pruned: HashSet<PathBuf>,
    notifications: Vec<Child>,
}

impl Pass {
    /// Waits for every notification command started during the pass.
    fn finish(mut self) -> ArchiveReport {
        for mut child in self.notifications.drain(..) {
            match child.wait() {
                Ok(status) if !status.success() => {
                    warn!(pid = child.id(), %status, "notification command failed");
                }
                Ok(_) => {}
                Err(e) => warn!(pid = child.id(), error = %e, "cannot wait for notification command"),
            }
        }
        self.report
    }
}

/// Moves entries selected by an [`ArchiveConfig`] into its archive tree.
#[derive(Debug)]
pub struct Archiver {
    config: ArchiveConfig,
    rules: CompiledRules,
    notifier: Option<Notifier>,
}

impl Archiver {
    /// Validates and compiles `config`.
    ///
    /// # Errors
    ///
    /// Any configuration problem is reported here, before the filesystem is
    /// touched.
    pub fn new(config: ArchiveConfig) -> Result<Self, ConfigError> {
        let rules = config.compile()?;
        let notifier = Notifier::from_config(&config);
        Ok(Self {
            config,
            rules,
            notifier,
        })
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Selects the entries to archive: everything under `src` matching the
    /// filters and not excluded.
    ///
    /// The result is collected before returning so the archive step never
    /// walks directories it is modifying.
    pub fn list(&self) -> Result<Vec<Entry>, ArchiveError> {
        if self.rules.filters.is_empty() {
            debug!(src = %self.config.src.display(), "no filters, selecting every entry");
        } else {
            let keys: Vec<&str> = self
                .rules
                .filters
                .predicates()
                .iter()
                .map(Predicate::key)
                .collect();
            debug!(src = %self.config.src.display(), filters = ?keys, "selecting entries");
        }

        let selected = select_entries(&self.config.src, &self.rules.filters).map_err(|e| {
            ArchiveError::SourceUnreadable {
                path: self.config.src.clone(),
                source: e,
            }
        })?;

        Ok(selected
            .filter(|entry| {
                let excluded = self.rules.exclude.is_excluded(entry);
                if excluded {
                    debug!(path = %entry.path().display(), "excluded by configuration");
                }
                !excluded
            })
            .collect())
    }

    /// Where `source` ends up in the archive tree, or `None` if it does not
    /// lie under the source root.
    pub fn destination_for(&self, source: &Path) -> Option<PathBuf> {
        let relative = source.strip_prefix(&self.config.src).ok()?;
        Some(self.config.dst.join(relative))
    }

    /// Lists what [`Archiver::archive`] would do without changing anything.
    pub fn plan(&self) -> Result<Vec<PlannedMove>, ArchiveError> {
        Ok(self
            .list()?
            .into_iter()
            .filter_map(|entry| {
                let destination = self.destination_for(entry.path())?;
                Some(PlannedMove {
                    entry_type: entry.entry_type(),
                    modified_at: entry.modified_at_secs().ok(),
                    source: entry.path().to_path_buf(),
                    destination,
                })
            })
            .collect())
    }

    /// Runs one archive pass.
    ///
    /// Notification commands started for failures are waited for before
    /// returning.
    ///
    /// # Errors
    ///
    /// Only an unreadable source root aborts the run. Failures on individual
    /// entries are collected in the returned report.
    pub fn archive(&self) -> Result<ArchiveReport, ArchiveError> {
        let entries = self.list()?;
        info!(
            src = %self.config.src.display(),
            dst = %self.config.dst.display(),
            count = entries.len(),
            "archiving selected entries"
        );

        let mut pass = Pass::default();

        for entry in entries {
            if pass.pruned.contains(entry.path()) {
                debug!(path = %entry.path().display(), "already removed while pruning");
                pass.report.skipped.push(entry.path().to_path_buf());
                continue;
            }
            if entry.is_dir() && holds_entries(entry.path()) {
                debug!(
                    path = %entry.path().display(),
                    "directory still holds entries that were not archived, leaving it in place"
                );
                pass.report.skipped.push(entry.path().to_path_buf());
                continue;
            }
            self.archive_entry(&entry, &mut pass);
        }

        let report = pass.finish();
        info!(
            moved = report.moved.len(),
            failed = report.failures.len(),
            pruned = report.pruned.len(),
            skipped = report.skipped.len(),
            "archive run finished"
        );
        Ok(report)
    }

    fn archive_entry(&self, entry: &Entry, pass: &mut Pass) {
        let source = entry.path();
        let Some(destination) = self.destination_for(source) else {
            warn!(path = %source.display(), "entry is outside the source root");
            return;
        };

        info!("Moving {} to {}", source.display(), destination.display());

        if let Some(parent) = destination.parent() {
            debug!("Creating {} directory if it does not exist", parent.display());
        }
        if let Err(e) = FileTransfer::ensure_parent(&destination) {
            self.record_failure(source, e, pass);
            return;
        }

        debug!("Copying {} to {}", source.display(), destination.display());
        if let Err(e) = FileTransfer::copy(source, &destination, self.config.copy_meta) {
            self.record_failure(source, e, pass);
            error!("Aborted for {} on copy, source left in place", source.display());
            return;
        }
        debug!("{} has been copied successfully", source.display());

        debug!("Deleting {} in source", source.display());
        if let Err(e) = FileTransfer::remove(source) {
            self.record_failure(source, e, pass);
            error!("{} was copied but not removed from source", source.display());
            return;
        }
        debug!("{} has been removed successfully", source.display());
        pass.report
            .moved
            .push((source.to_path_buf(), destination.clone()));

        let Some(parent) = source.parent() else {
            return;
        };
        debug!("Removing empty directories from {}", parent.display());
        match prune_empty_dirs(parent, &self.config.src) {
            Ok(removed) => {
                pass.pruned.extend(removed.iter().cloned());
                pass.report.pruned.extend(removed);
            }
            Err(e) => {
                pass.pruned.extend(e.removed.iter().cloned());
                pass.report.pruned.extend(e.removed.iter().cloned());
                self.record_failure(source, TransferError::from(e), pass);
            }
        }
    }

    /// Logs a failed step, runs the notification command and records the
    /// failure in the report.
    fn record_failure(&self, entry: &Path, err: TransferError, pass: &mut Pass) {
        let args = err
            .paths()
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        error!(
            step = err.step(),
            path = %entry.display(),
            args = %args,
            error = %err,
            "archive step failed"
        );

        if let Some(notifier) = &self.notifier {
            let subject = format!(
                "[Auto Archive Files] FAILED to archive {}",
                self.config.src.display()
            );
            let body = format!(
                "Error on step {}.\nArgs: {}\nException: {}",
                err.step(),
                args,
                err
            );
            match notifier.notify(&subject, &body) {
                Ok(child) => pass.notifications.push(child),
                Err(e) => error!(error = %e, "failed to run notification command"),
            }
        }

        pass.report.failures.push((entry.to_path_buf(), err));
    }
}

/// True if `dir` can be listed and has at least one child.
fn holds_entries(dir: &Path) -> bool {
    fs::read_dir(dir).is_ok_and(|mut children| children.next().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    struct Roots {
        _temp_dir: TempDir,
        src: PathBuf,
        dst: PathBuf,
    }

    fn roots() -> Roots {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        Roots {
            _temp_dir: temp_dir,
            src,
            dst,
        }
    }

    fn archiver(roots: &Roots, filters: serde_json::Value) -> Archiver {
        let config: ArchiveConfig = serde_json::from_value(json!({
            "src": roots.src,
            "dst": roots.dst,
            "filters": filters,
        }))
        .unwrap();
        Archiver::new(config).unwrap()
    }

    #[test]
    fn test_destination_preserves_relative_path() {
        let roots = roots();
        let archiver = archiver(&roots, json!({}));

        assert_eq!(
            archiver.destination_for(&roots.src.join("a/b/file.txt")),
            Some(roots.dst.join("a/b/file.txt"))
        );
        assert_eq!(archiver.destination_for(Path::new("/elsewhere/file.txt")), None);
    }

    #[test]
    fn test_moves_nested_file_and_prunes_source() {
        let roots = roots();
        fs::create_dir_all(roots.src.join("a/b")).unwrap();
        fs::write(roots.src.join("a/b/file.txt"), "data").unwrap();

        let report = archiver(&roots, json!({"type": "file"})).archive().unwrap();

        assert_eq!(report.moved.len(), 1);
        assert!(report.is_complete_success());
        assert_eq!(
            fs::read_to_string(roots.dst.join("a/b/file.txt")).unwrap(),
            "data"
        );
        assert!(!roots.src.join("a").exists());
        assert!(roots.src.exists());
        assert_eq!(report.pruned, vec![roots.src.join("a/b"), roots.src.join("a")]);
    }

    #[test]
    fn test_pruned_directories_are_skipped_not_failed() {
        let roots = roots();
        fs::create_dir_all(roots.src.join("a")).unwrap();
        fs::write(roots.src.join("a/file.txt"), "data").unwrap();

        let report = archiver(&roots, json!({})).archive().unwrap();

        assert!(report.is_complete_success());
        assert_eq!(report.moved.len(), 1);
        assert_eq!(report.skipped, vec![roots.src.join("a")]);
        assert_eq!(report.total_processed(), 2);
    }

    #[test]
    fn test_matching_empty_directory_is_recreated_in_archive() {
        let roots = roots();
        fs::create_dir_all(roots.src.join("empty")).unwrap();

        let report = archiver(&roots, json!({"type": "dir"})).archive().unwrap();

        assert!(report.is_complete_success());
        assert!(roots.dst.join("empty").is_dir());
        assert!(!roots.src.join("empty").exists());
    }

    #[test]
    fn test_directory_with_unselected_children_is_skipped() {
        let roots = roots();
        fs::create_dir_all(roots.src.join("a")).unwrap();
        fs::write(roots.src.join("a/keep.txt"), "keep").unwrap();

        let report = archiver(&roots, json!({"type": "dir"})).archive().unwrap();

        assert!(report.is_complete_success());
        assert!(report.moved.is_empty());
        assert_eq!(report.skipped, vec![roots.src.join("a")]);
        assert!(roots.src.join("a/keep.txt").exists());
        assert!(!roots.dst.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_notification_finishes_before_archive_returns() {
        let roots = roots();
        fs::write(roots.src.join("blocked.txt"), "data").unwrap();
        fs::create_dir_all(roots.dst.join("blocked.txt")).unwrap();
        let marker = roots.src.parent().unwrap().join("alert.txt");
        let config: ArchiveConfig = serde_json::from_value(json!({
            "src": roots.src,
            "dst": roots.dst,
            "on_fail": [
                "/bin/sh",
                "-c",
                format!("sleep 0.2; printf '%s' \"$1\" > '{}'", marker.display()),
                "notify"
            ],
        }))
        .unwrap();

        let report = Archiver::new(config).unwrap().archive().unwrap();

        assert_eq!(report.failures.len(), 1);
        assert!(
            fs::read_to_string(&marker)
                .unwrap()
                .starts_with("[Auto Archive Files] FAILED to archive")
        );
    }

    #[test]
    fn test_copy_failure_keeps_source() {
        let roots = roots();
        fs::write(roots.src.join("blocked.txt"), "data").unwrap();
        fs::create_dir_all(roots.dst.join("blocked.txt")).unwrap();

        let report = archiver(&roots, json!({})).archive().unwrap();

        assert!(report.moved.is_empty());
        assert_eq!(report.failures_of("copy").count(), 1);
        assert!(roots.src.join("blocked.txt").exists());
    }

    #[test]
    fn test_missing_source_root_is_fatal() {
        let roots = roots();
        fs::remove_dir(&roots.src).unwrap();

        assert!(matches!(
            archiver(&roots, json!({})).archive(),
            Err(ArchiveError::SourceUnreadable { .. })
        ));
    }

    #[test]
    fn test_plan_changes_nothing() {
        let roots = roots();
        fs::write(roots.src.join("file.txt"), "data").unwrap();

        let plan = archiver(&roots, json!({"type": "file"})).plan().unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].destination, roots.dst.join("file.txt"));
        assert_eq!(plan[0].entry_type, Some(EntryType::File));
        assert!(plan[0].modified_at.is_some());
        assert!(roots.src.join("file.txt").exists());
        assert!(!roots.dst.exists());
    }
}
