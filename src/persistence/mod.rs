//! Persistence layer for harvest runs.
//!
//! Everything a run needs to resume after a crash or a stop lives under one
//! state directory.
//!
//! # File Layout
//!
//! ```text
//! <state_dir>/
//!   progress.json                  # cumulative unit counters
//!   processed/<category>.log       # completed work items (JSON Lines)
//!   vendors/<category>_vendors.json # deduplicated result records
//!   errors/<category>.log          # per-unit failures (JSON Lines)
//!   exports/                       # periodic export snapshots
//! ```
//!
//! # Crash Safety
//!
//! - Journals (processed sets, error logs): appends are fsynced, and a torn
//!   final line is truncated on replay
//! - Whole-file state (progress, dedup stores): written atomically with
//!   write-to-temp-then-rename, with fsync on both the file and its directory
//!
//! Items are marked processed only after their results are durably committed
//! to the dedup store, so a crash between the two replays the item and the
//! dedup store absorbs the duplicate results.

pub mod dedup;
pub mod durable;
pub mod error_log;
pub mod journal;
pub mod layout;
pub mod processed;
pub mod progress;

use std::io;

use thiserror::Error;

pub use dedup::DedupStore;
pub use durable::{fsync_dir, fsync_file, read_json_optional, write_atomic, write_json_atomic};
pub use error_log::{ErrorLog, ErrorLogEntry};
pub use journal::{Journal, JournalEntry, JournalError};
pub use layout::StateLayout;
pub use processed::ProcessedSet;
pub use progress::{ProgressCounters, ProgressStore};

/// Errors from durable state operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
}
