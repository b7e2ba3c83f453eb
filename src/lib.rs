//! auto-archive-files - move aged files into an archive tree
//!
//! This library selects filesystem entries with declarative filters over their
//! attributes, copies them into a destination tree at the same relative path,
//! removes the originals and prunes the directories left empty behind them.
//! Failures on one entry are logged and reported without stopping the run.

pub mod archiver;
pub mod cli;
pub mod config;
pub mod entry;
pub mod filter;
pub mod logging;
pub mod notify;
pub mod output;
pub mod prune;
pub mod selector;
pub mod transfer;

pub use archiver::{ArchiveError, ArchiveReport, Archiver, PlannedMove};
pub use config::{ArchiveConfig, ConfigError, ExcludeRules};
pub use entry::{Entry, EntryType};
pub use filter::{FilterError, FilterSpec, Predicate};
pub use prune::prune_empty_dirs;
pub use selector::select_entries;
pub use transfer::{FileTransfer, TransferError};
