/// Filesystem steps used to move one entry into the archive tree.
///
/// Each step is a separate call returning its own [`TransferError`], so the
/// pipeline can decide what to do after a failure. In particular a failed
/// copy must never be followed by removal of the source.
use crate::prune::PruneError;
use filetime::FileTime;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::trace;

/// Errors from a single transfer step.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The parent directory of the destination could not be created.
    #[error("failed to create directory {}: {source}", .path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },
    /// The entry could not be copied to its destination.
    #[error("failed to copy {} to {}: {source}", .from.display(), .to.display())]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    /// The source could not be removed after a successful copy.
    #[error("failed to remove {}: {source}", .path.display())]
    RemoveFailed { path: PathBuf, source: io::Error },
    /// Emptied ancestors of the source could not be pruned.
    #[error(transparent)]
    PruneFailed(#[from] PruneError),
}

impl TransferError {
    /// Short name of the step that failed.
    pub fn step(&self) -> &'static str {
        match self {
            Self::DirectoryCreationFailed { .. } => "makedirs",
            Self::CopyFailed { .. } => "copy",
            Self::RemoveFailed { .. } => "remove",
            Self::PruneFailed(_) => "prune",
        }
    }

    /// The paths the failing step operated on.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Self::DirectoryCreationFailed { path, .. } | Self::RemoveFailed { path, .. } => {
                vec![path.as_path()]
            }
            Self::CopyFailed { from, to, .. } => vec![from.as_path(), to.as_path()],
            Self::PruneFailed(e) => vec![e.path.as_path()],
        }
    }
}

/// Result type for transfer steps.
pub type TransferResult<T> = Result<T, TransferError>;

/// Copies and removes entries for the archive pipeline.
pub struct FileTransfer;

impl FileTransfer {
    /// Creates the parent directory of `destination` and any missing ancestors.
    ///
    /// A parent that already exists is not an error.
    pub fn ensure_parent(destination: &Path) -> TransferResult<()> {
        let Some(parent) = destination.parent() else {
            return Ok(());
        };
        fs::create_dir_all(parent).map_err(|e| TransferError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        })
    }

    /// Copies `source` to `destination`.
    ///
    /// Regular files are copied by content. For a directory only the
    /// directory itself is created at `destination`; its contents are
    /// archived as entries of their own. When `preserve_metadata` is set,
    /// permissions and access/modification times are carried over as well.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use auto_archive_files::transfer::FileTransfer;
    /// use std::path::Path;
    ///
    /// FileTransfer::copy(
    ///     Path::new("/data/2023/report.pdf"),
    ///     Path::new("/archive/2023/report.pdf"),
    ///     true,
    /// )
    /// .unwrap();
    /// ```
    pub fn copy(source: &Path, destination: &Path, preserve_metadata: bool) -> TransferResult<()> {
        let result = if source.is_dir() {
            create_archive_dir(source, destination, preserve_metadata)
        } else {
            copy_file(source, destination, preserve_metadata)
        };
        result.map_err(|e| TransferError::CopyFailed {
            from: source.to_path_buf(),
            to: destination.to_path_buf(),
            source: e,
        })
    }

    /// Removes `path`.
    ///
    /// Directories are only removed when empty. Whatever is still inside one
    /// was not selected for archiving, so a non-empty directory is an error.
    pub fn remove(path: &Path) -> TransferResult<()> {
        let result = if path.is_dir() && !path.is_symlink() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| TransferError::RemoveFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

fn copy_file(source: &Path, destination: &Path, preserve_metadata: bool) -> io::Result<()> {
    let mut reader = File::open(source)?;
    let mut writer = File::create(destination)?;
    io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    drop(writer);

    if preserve_metadata {
        copy_metadata(source, destination)?;
    }
    Ok(())
}

fn create_archive_dir(source: &Path, destination: &Path, preserve_metadata: bool) -> io::Result<()> {
    fs::create_dir_all(destination)?;
    trace!(path = %destination.display(), "created archive directory");

    if preserve_metadata {
        copy_metadata(source, destination)?;
    }
    Ok(())
}

fn copy_metadata(source: &Path, destination: &Path) -> io::Result<()> {
    let metadata = fs::metadata(source)?;
    fs::set_permissions(destination, metadata.permissions())?;
    filetime::set_file_times(
        destination,
        FileTime::from_last_access_time(&metadata),
        FileTime::from_last_modification_time(&metadata),
    )
}
