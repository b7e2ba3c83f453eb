/// Removal of directories left empty after their contents were archived.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// A directory could not be inspected or removed while pruning.
///
/// The climb stops at the failing directory; `removed` lists what was already
/// deleted below it.
#[derive(Debug, Error)]
#[error("failed to prune {}: {source}", .path.display())]
pub struct PruneError {
    pub path: PathBuf,
    pub removed: Vec<PathBuf>,
    #[source]
    pub source: io::Error,
}

/// Removes `path` and then each of its ancestors while they are empty,
/// stopping at `root`.
///
/// `root` itself is never removed, and neither is anything outside of it.
/// The walk ends at the first directory that still has children, or at a
/// symlink, which is left alone. Paths are
/// compared by component, so `/data/` and `/data` name the same root.
///
/// Returns the removed directories, deepest first.
///
/// # Examples
///
/// ```no_run
/// use auto_archive_files::prune::prune_empty_dirs;
/// use std::path::Path;
///
/// let removed = prune_empty_dirs(Path::new("/data/2023/01"), Path::new("/data")).unwrap();
/// for dir in removed {
///     println!("removed {}", dir.display());
/// }
/// ```
pub fn prune_empty_dirs(path: &Path, root: &Path) -> Result<Vec<PathBuf>, PruneError> {
    let mut removed = Vec::new();
    let mut current = path.to_path_buf();

    while current != root && current.starts_with(root) {
        if current.is_symlink() {
            break;
        }
        let is_empty = match fs::read_dir(&current) {
            Ok(mut children) => children.next().is_none(),
            Err(source) => {
                return Err(PruneError {
                    path: current,
                    removed,
                    source,
                });
            }
        };
        if !is_empty {
            break;
        }

        if let Err(source) = fs::remove_dir(&current) {
            return Err(PruneError {
                path: current,
                removed,
                source,
            });
        }
        debug!(path = %current.display(), "removed empty directory");

        let parent = current.parent().map(Path::to_path_buf);
        removed.push(current);
        match parent {
            Some(parent) => current = parent,
            None => break,
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prunes_empty_chain_but_not_root() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("src");
        let deepest = root.join("a/b/c");
        fs::create_dir_all(&deepest).unwrap();

        let removed = prune_empty_dirs(&deepest, &root).unwrap();

        assert_eq!(removed, vec![root.join("a/b/c"), root.join("a/b"), root.join("a")]);
        assert!(root.exists());
        assert!(!root.join("a").exists());
    }

    #[test]
    fn test_stops_at_first_non_empty_ancestor() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("src");
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::write(root.join("a/keep.txt"), "keep").unwrap();

        let removed = prune_empty_dirs(&root.join("a/b/c"), &root).unwrap();

        assert_eq!(removed.len(), 2);
        assert!(root.join("a").exists());
        assert!(root.join("a/keep.txt").exists());
    }

    #[test]
    fn test_non_empty_start_removes_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("a/file.txt"), "x").unwrap();

        let removed = prune_empty_dirs(&root.join("a"), root).unwrap();
        assert!(removed.is_empty());
        assert!(root.join("a/file.txt").exists());
    }

    #[test]
    fn test_root_with_trailing_separator_is_kept() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("src");
        fs::create_dir_all(root.join("a")).unwrap();
        let root_with_slash = PathBuf::from(format!("{}/", root.display()));

        let removed = prune_empty_dirs(&root.join("a"), &root_with_slash).unwrap();
        assert_eq!(removed, vec![root.join("a")]);

        prune_empty_dirs(&root, &root_with_slash).unwrap();
        assert!(root.exists());
    }

    #[test]
    fn test_never_climbs_outside_root() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let outside = temp_dir.path().join("elsewhere");
        fs::create_dir_all(&outside).unwrap();

        let removed = prune_empty_dirs(&outside, &temp_dir.path().join("src")).unwrap();
        assert!(removed.is_empty());
        assert!(outside.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_stops_at_symlinked_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("src");
        fs::create_dir_all(root.join("real")).unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("link")).unwrap();

        let removed = prune_empty_dirs(&root.join("link"), &root).unwrap();

        assert!(removed.is_empty());
        assert!(root.join("link").is_symlink());
        assert!(root.join("real").is_dir());
    }

    #[test]
    fn test_missing_directory_reports_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let err = prune_empty_dirs(&temp_dir.path().join("gone"), temp_dir.path()).unwrap_err();
        assert_eq!(err.path, temp_dir.path().join("gone"));
        assert!(err.removed.is_empty());
    }
}
