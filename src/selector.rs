//! Lazy recursive selection of entries matching a filter.
//!
//! The walk is depth-first. Every directory is descended into whether or not
//! it matches, and is then tested against the filter itself once its subtree
//! is exhausted, so matching descendants are always yielded before their
//! matching ancestors.
//!
//! Directory symlinks are followed. A symlink cycle is walked until the
//! operating system refuses to resolve the path any further; there is no
//! cycle detection.

use crate::entry::Entry;
use crate::filter::FilterSpec;
use std::fs::{self, ReadDir};
use std::io;
use std::path::Path;
use tracing::{trace, warn};

/// One directory being listed, plus the directory entry waiting for its own
/// filter test. The root frame has no pending entry.
struct Frame {
    children: ReadDir,
    dir: Option<Entry>,
}

/// Iterator over the entries below a root that satisfy a [`FilterSpec`].
///
/// Created by [`select_entries`]. Single pass; it cannot be restarted.
pub struct SelectEntries<'a> {
    filter: &'a FilterSpec,
    stack: Vec<Frame>,
}

/// Starts a filtered walk of `root`.
///
/// # Errors
///
/// Fails only if `root` itself cannot be listed. Problems further down the
/// tree are logged and skip the affected node.
///
/// # Examples
///
/// ```no_run
/// use auto_archive_files::filter::FilterSpec;
/// use auto_archive_files::selector::select_entries;
/// use std::path::Path;
///
/// let everything = FilterSpec::match_all();
/// for entry in select_entries(Path::new("/var/spool/reports"), &everything).unwrap() {
///     println!("{}", entry.path().display());
/// }
/// ```
pub fn select_entries<'a>(root: &Path, filter: &'a FilterSpec) -> io::Result<SelectEntries<'a>> {
    let children = fs::read_dir(root)?;
    Ok(SelectEntries {
        filter,
        stack: vec![Frame {
            children,
            dir: None,
        }],
    })
}

impl SelectEntries<'_> {
    fn admit(&self, entry: Entry) -> Option<Entry> {
        match self.filter.matches(&entry) {
            Ok(true) => Some(entry),
            Ok(false) => None,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping entry that could not be inspected");
                None
            }
        }
    }
}

impl Iterator for SelectEntries<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        loop {
            let next_child = self.stack.last_mut()?.children.next();

            match next_child {
                Some(Ok(raw)) => {
                    let entry = Entry::from_dir_entry(&raw);
                    if entry.is_broken_symlink() {
                        trace!(path = %entry.path().display(), "skipping broken symlink");
                        continue;
                    }

                    if entry.is_dir() {
                        match fs::read_dir(entry.path()) {
                            Ok(children) => {
                                trace!(path = %entry.path().display(), "descending");
                                self.stack.push(Frame {
                                    children,
                                    dir: Some(entry),
                                });
                                continue;
                            }
                            Err(e) => {
                                warn!(path = %entry.path().display(), error = %e, "cannot list directory, not descending");
                            }
                        }
                    }

                    if let Some(entry) = self.admit(entry) {
                        return Some(entry);
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                }
                None => {
                    let finished = self.stack.pop().and_then(|frame| frame.dir);
                    if let Some(dir) = finished
                        && let Some(dir) = self.admit(dir)
                    {
                        return Some(dir);
                    }
                }
            }
        }
    }
}
