//! Append-only log of unit failures, one journal per category.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::journal::{Journal, JournalEntry, Result};
use crate::dispatch::UnitFailure;
use crate::types::WorkItem;

/// One failed unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub item: WorkItem,
    pub failure: UnitFailure,
}

/// Journal of [`ErrorLogEntry`]s.
pub struct ErrorLog {
    journal: Journal<ErrorLogEntry>,
}

impl ErrorLog {
    /// Opens the log at `path`, repairing a torn tail.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (journal, entries) = Journal::recover(path)?;
        debug!(path = %journal.path().display(), existing = entries.len(), "Opened error log");
        Ok(ErrorLog { journal })
    }

    /// Appends a batch's failures with a single fsync.
    pub fn append_all<'a>(
        &mut self,
        errors: impl IntoIterator<Item = &'a (WorkItem, UnitFailure)>,
    ) -> Result<usize> {
        let mut written = 0;
        for (item, failure) in errors {
            self.journal.append_with_sync(
                ErrorLogEntry {
                    item: item.clone(),
                    failure: failure.clone(),
                },
                false,
            )?;
            written += 1;
        }
        if written > 0 {
            self.journal.sync()?;
        }
        Ok(written)
    }

    /// Reads every entry in the log at `path`.
    pub fn read(path: impl AsRef<Path>) -> Result<Vec<JournalEntry<ErrorLogEntry>>> {
        let (entries, _) = Journal::replay(path)?;
        Ok(entries)
    }
}
