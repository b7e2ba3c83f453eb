/// Filesystem entries examined during a scan.
///
/// An [`Entry`] only remembers its path and base name. Every attribute is read
/// from the live filesystem on access, so an entry that is modified or removed
/// after it was discovered reports its current state rather than a snapshot.
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// The kind of node an entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// A directory, or a symlink resolving to one.
    Dir,
    /// A regular file, or a symlink resolving to one.
    File,
    /// A symlink that resolves to neither a directory nor a regular file.
    Symlink,
}

impl EntryType {
    /// Returns the name used for this type in filter specifications.
    ///
    /// # Examples
    ///
    /// ```
    /// use auto_archive_files::entry::EntryType;
    ///
    /// assert_eq!(EntryType::Dir.as_str(), "dir");
    /// assert_eq!(EntryType::parse("file"), Some(EntryType::File));
    /// assert_eq!(EntryType::parse("socket"), None);
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Dir => "dir",
            EntryType::File => "file",
            EntryType::Symlink => "symlink",
        }
    }

    /// Parses a type name as written in a filter specification.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "dir" => Some(EntryType::Dir),
            "file" => Some(EntryType::File),
            "symlink" => Some(EntryType::Symlink),
            _ => None,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One filesystem node found while walking a directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    path: PathBuf,
    name: String,
}

impl Entry {
    /// Creates an entry for the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self { path, name }
    }

    pub(crate) fn from_dir_entry(entry: &fs::DirEntry) -> Self {
        Self {
            path: entry.path(),
            name: entry.file_name().to_string_lossy().to_string(),
        }
    }

    /// The full path of the node.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The base name of the node.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if the node is a directory, following symlinks.
    pub fn is_dir(&self) -> bool {
        self.path.is_dir()
    }

    /// True if the node is a regular file, following symlinks.
    pub fn is_file(&self) -> bool {
        self.path.is_file()
    }

    /// True if the node itself is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.path.is_symlink()
    }

    /// True if the node is a symbolic link whose target does not exist.
    pub fn is_broken_symlink(&self) -> bool {
        self.is_symlink() && !self.path.exists()
    }

    /// Classifies the node, probing directory, then file, then symlink.
    ///
    /// Returns `None` if none of the probes succeed, which happens when the
    /// node disappeared after it was listed.
    pub fn entry_type(&self) -> Option<EntryType> {
        if self.is_dir() {
            Some(EntryType::Dir)
        } else if self.is_file() {
            Some(EntryType::File)
        } else if self.is_symlink() {
            Some(EntryType::Symlink)
        } else {
            None
        }
    }

    /// Last modification time, following symlinks.
    pub fn modified_at(&self) -> io::Result<SystemTime> {
        fs::metadata(&self.path)?.modified()
    }

    /// Last modification time as fractional seconds since the Unix epoch.
    pub fn modified_at_secs(&self) -> io::Result<f64> {
        Ok(epoch_secs(self.modified_at()?))
    }

    /// Seconds elapsed between the last modification and now.
    ///
    /// Computed on every call. Negative when the modification time lies in
    /// the future.
    pub fn seconds_since_modified(&self) -> io::Result<f64> {
        let modified = self.modified_at_secs()?;
        Ok(epoch_secs(SystemTime::now()) - modified)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.entry_type() {
            Some(EntryType::Dir) => "Dir",
            Some(EntryType::File) => "File",
            Some(EntryType::Symlink) => "Symlink",
            None => "Entry",
        };
        write!(f, "<{} \"{}\">", label, self.name)
    }
}

/// Converts a timestamp to signed fractional seconds relative to the epoch.
pub(crate) fn epoch_secs(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::TempDir;

    #[test]
    fn test_entry_name_from_path() {
        let entry = Entry::new("/data/reports/q1.csv");
        assert_eq!(entry.name(), "q1.csv");
        assert_eq!(entry.path(), Path::new("/data/reports/q1.csv"));
    }

    #[test]
    fn test_entry_types() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path().join("sub");
        let file = temp_dir.path().join("file.txt");
        fs::create_dir(&dir).unwrap();
        fs::write(&file, "content").unwrap();

        assert_eq!(Entry::new(&dir).entry_type(), Some(EntryType::Dir));
        assert_eq!(Entry::new(&file).entry_type(), Some(EntryType::File));
        assert_eq!(Entry::new(temp_dir.path().join("gone")).entry_type(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_resolve_and_broken_links_are_detected() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let target = temp_dir.path().join("target.txt");
        fs::write(&target, "content").unwrap();

        let good = temp_dir.path().join("good");
        let broken = temp_dir.path().join("broken");
        std::os::unix::fs::symlink(&target, &good).unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("missing"), &broken).unwrap();

        let good = Entry::new(good);
        assert!(good.is_symlink());
        assert!(!good.is_broken_symlink());
        assert_eq!(good.entry_type(), Some(EntryType::File));

        let broken = Entry::new(broken);
        assert!(broken.is_broken_symlink());
        assert_eq!(broken.entry_type(), Some(EntryType::Symlink));
    }

    #[test]
    fn test_seconds_since_modified_tracks_mtime() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let file = temp_dir.path().join("old.log");
        fs::write(&file, "content").unwrap();

        let two_days_ago = SystemTime::now() - std::time::Duration::from_secs(2 * 86_400);
        filetime::set_file_mtime(&file, FileTime::from_system_time(two_days_ago)).unwrap();

        let age = Entry::new(&file).seconds_since_modified().unwrap();
        assert!(age >= 2.0 * 86_400.0);
        assert!(age < 2.0 * 86_400.0 + 60.0);
    }

    #[test]
    fn test_vanished_entry_reports_error() {
        let entry = Entry::new("/non/existent/path/file.txt");
        assert!(entry.modified_at().is_err());
        assert!(entry.seconds_since_modified().is_err());
    }

    #[test]
    fn test_display_uses_type_label() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let file = temp_dir.path().join("notes.txt");
        fs::write(&file, "x").unwrap();

        assert_eq!(Entry::new(&file).to_string(), "<File \"notes.txt\">");
        assert_eq!(
            Entry::new(temp_dir.path().join("gone.txt")).to_string(),
            "<Entry \"gone.txt\">"
        );
    }
}
