//! Durable record of which work items have been completed.
//!
//! Backed by a [`Journal`] of [`ProcessedRecord`]s, one per line. A mark is
//! fsynced before [`ProcessedSet::mark_processed`] returns, so a crash after
//! the call never loses it, and a crash before it leaves the item to be
//! retried on restart (at-least-once processing).

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use super::PersistenceError;
use super::journal::Journal;
use crate::catalog::ProcessedLookup;
use crate::types::ProcessedRecord;

struct ProcessedInner {
    records: HashSet<ProcessedRecord>,
    /// `None` for purely in-memory sets.
    journal: Option<Journal<ProcessedRecord>>,
}

/// A set of processed item identities, optionally persisted.
///
/// Lookups and marks are guarded by a single mutex, so each mark is
/// linearizable with respect to concurrent lookups.
pub struct ProcessedSet {
    inner: Mutex<ProcessedInner>,
}

impl ProcessedSet {
    /// Creates an empty set that is never written to disk.
    pub fn in_memory() -> Self {
        ProcessedSet {
            inner: Mutex::new(ProcessedInner {
                records: HashSet::new(),
                journal: None,
            }),
        }
    }

    /// Loads the set from `path`, creating the file if it is absent.
    ///
    /// A torn final line from an interrupted write is discarded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let (journal, entries) = Journal::<ProcessedRecord>::recover(path)?;
        let records: HashSet<ProcessedRecord> = entries.into_iter().map(|e| e.data).collect();

        info!(
            path = %path.display(),
            processed = records.len(),
            "Loaded processed set"
        );

        Ok(ProcessedSet {
            inner: Mutex::new(ProcessedInner {
                records,
                journal: Some(journal),
            }),
        })
    }

    /// Marks an identity as processed.
    ///
    /// Idempotent: returns `Ok(false)` without writing if already present.
    /// If the durable write fails the identity is still recorded in memory
    /// and the error is returned for the caller to log.
    pub fn mark_processed(&self, record: &ProcessedRecord) -> Result<bool, PersistenceError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.records.contains(record) {
            return Ok(false);
        }
        inner.records.insert(record.clone());

        if let Some(journal) = inner.journal.as_mut() {
            journal.append(record.clone())?;
        }
        debug!(record = %record, "Marked as processed");
        Ok(true)
    }

    pub fn is_processed(&self, record: &ProcessedRecord) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .contains(record)
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProcessedLookup for ProcessedSet {
    fn contains_record(&self, record: &ProcessedRecord) -> bool {
        self.is_processed(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn absent_store_loads_empty() {
        let dir = tempdir().unwrap();
        let set = ProcessedSet::load(dir.path().join("processed").join("x.log")).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn marks_survive_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("processed.log");

        let set = ProcessedSet::load(&path).unwrap();
        assert!(set.mark_processed(&"Fresno, CA 93650".into()).unwrap());
        assert!(set.mark_processed(&"Albany, NY 12201".into()).unwrap());
        drop(set);

        let reloaded = ProcessedSet::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.is_processed(&"Fresno, CA 93650".into()));
        assert!(!reloaded.is_processed(&"Reno, NV 89501".into()));
    }

    #[test]
    fn mark_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("processed.log");

        let set = ProcessedSet::load(&path).unwrap();
        assert!(set.mark_processed(&"a".into()).unwrap());
        assert!(!set.mark_processed(&"a".into()).unwrap());
        drop(set);

        let lines = std::fs::read_to_string(&path).unwrap();
        assert_eq!(lines.lines().count(), 1);
    }

    #[test]
    fn torn_tail_is_ignored_and_appends_continue() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("processed.log");

        let set = ProcessedSet::load(&path).unwrap();
        set.mark_processed(&"a".into()).unwrap();
        drop(set);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, r#"{{"seq":1,"ts":"2024-01-01T0"#).unwrap();
        drop(file);

        let set = ProcessedSet::load(&path).unwrap();
        assert_eq!(set.len(), 1);
        set.mark_processed(&"b".into()).unwrap();
        drop(set);

        let set = ProcessedSet::load(&path).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn in_memory_set_does_not_touch_disk() {
        let set = ProcessedSet::in_memory();
        assert!(set.mark_processed(&"a".into()).unwrap());
        assert!(set.contains_record(&"a".into()));
    }
}
