//! Durable processed/succeeded/failed counters.
//!
//! Counters are cumulative across runs: they are loaded at startup and
//! rewritten atomically after every unit of work. The per-unit flush is
//! deliberately synchronous and unbatched so that a crash loses at most the
//! counters of units still in flight.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::PersistenceError;
use super::durable::{read_json_optional, write_json_atomic};

/// Progress counters.
///
/// Invariant: `total_processed == successful + failed` after every flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounters {
    pub total_processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub last_update: DateTime<Utc>,
}

impl ProgressCounters {
    pub fn new() -> Self {
        ProgressCounters {
            total_processed: 0,
            successful: 0,
            failed: 0,
            last_update: Utc::now(),
        }
    }

    /// Returns true if the total equals the sum of its parts.
    pub fn is_consistent(&self) -> bool {
        self.total_processed == self.successful + self.failed
    }
}

impl Default for ProgressCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutex-guarded counters with an optional backing file.
pub struct ProgressStore {
    path: Option<PathBuf>,
    counters: Mutex<ProgressCounters>,
}

impl ProgressStore {
    /// Creates zeroed counters that are never written to disk.
    pub fn in_memory() -> Self {
        ProgressStore {
            path: None,
            counters: Mutex::new(ProgressCounters::new()),
        }
    }

    /// Loads counters from `path`.
    ///
    /// A missing file starts from zero. An unreadable or malformed file is
    /// logged and also starts from zero; it is overwritten on the next flush.
    /// Inconsistent totals are repaired to `successful + failed`.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut counters = match read_json_optional::<ProgressCounters>(path) {
            Ok(Some(counters)) => counters,
            Ok(None) => ProgressCounters::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load progress, starting from zero");
                ProgressCounters::new()
            }
        };

        if !counters.is_consistent() {
            warn!(
                total_processed = counters.total_processed,
                successful = counters.successful,
                failed = counters.failed,
                "Repairing inconsistent progress counters"
            );
            counters.total_processed = counters.successful + counters.failed;
        }

        info!(
            path = %path.display(),
            total_processed = counters.total_processed,
            successful = counters.successful,
            failed = counters.failed,
            "Loaded progress"
        );

        ProgressStore {
            path: Some(path.to_path_buf()),
            counters: Mutex::new(counters),
        }
    }

    /// Counts one successful unit and flushes.
    pub fn record_success(&self) -> ProgressCounters {
        self.record(true)
    }

    /// Counts one failed unit and flushes.
    pub fn record_failure(&self) -> ProgressCounters {
        self.record(false)
    }

    fn record(&self, success: bool) -> ProgressCounters {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        if success {
            counters.successful += 1;
        } else {
            counters.failed += 1;
        }
        counters.total_processed += 1;
        counters.last_update = Utc::now();

        // Flushed under the lock so file writes are ordered like the updates.
        if let Err(e) = self.write(&counters) {
            warn!(error = %e, "Failed to flush progress; continuing with in-memory counters");
        }
        counters.clone()
    }

    /// Returns a snapshot of the current counters.
    pub fn snapshot(&self) -> ProgressCounters {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Writes the current counters to disk.
    pub fn flush(&self) -> Result<(), PersistenceError> {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        self.write(&counters)
    }

    fn write(&self, counters: &ProgressCounters) -> Result<(), PersistenceError> {
        match &self.path {
            Some(path) => write_json_atomic(path, counters),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn missing_file_starts_at_zero() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::load(dir.path().join("progress.json"));
        let snap = store.snapshot();
        assert_eq!(snap.total_processed, 0);
        assert!(snap.is_consistent());
    }

    #[test]
    fn every_record_is_flushed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");

        let store = ProgressStore::load(&path);
        store.record_success();
        store.record_failure();
        store.record_success();

        let on_disk: ProgressCounters =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.total_processed, 3);
        assert_eq!(on_disk.successful, 2);
        assert_eq!(on_disk.failed, 1);
    }

    #[test]
    fn counters_accumulate_across_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");

        ProgressStore::load(&path).record_success();
        let store = ProgressStore::load(&path);
        store.record_failure();

        let snap = store.snapshot();
        assert_eq!(snap.total_processed, 2);
        assert_eq!(snap.successful, 1);
        assert_eq!(snap.failed, 1);
    }

    #[test]
    fn malformed_file_starts_at_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "{\"total_processed\": ").unwrap();

        let store = ProgressStore::load(&path);
        assert_eq!(store.snapshot().total_processed, 0);
        store.record_success();
        assert_eq!(ProgressStore::load(&path).snapshot().successful, 1);
    }

    #[test]
    fn inconsistent_totals_are_repaired() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(
            &path,
            r#"{"total_processed": 10, "successful": 2, "failed": 3, "last_update": "2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let snap = ProgressStore::load(&path).snapshot();
        assert_eq!(snap.total_processed, 5);
    }

    #[test]
    fn concurrent_updates_stay_consistent() {
        let dir = tempdir().unwrap();
        let store = Arc::new(ProgressStore::load(dir.path().join("progress.json")));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        if i % 2 == 0 {
                            store.record_success();
                        } else {
                            store.record_failure();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = store.snapshot();
        assert_eq!(snap.total_processed, 80);
        assert_eq!(snap.successful, 40);
        assert!(snap.is_consistent());
    }
}
