//! Per-category store of deduplicated result records.
//!
//! Each category is one JSON array at `<dir>/<category>_vendors.json`,
//! rewritten in full on every save. Writers to the same category are
//! serialized by a per-category async lock; different categories never
//! contend.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::PersistenceError;
use super::durable::{read_json_optional, write_json_atomic};
use crate::types::{ADDED_DATE_FIELD, Category, DedupFields, RECORD_ID_FIELD, ResultRecord};

/// Lookup sets built from the records already stored for a category.
#[derive(Debug, Default)]
struct SeenKeys {
    names: HashSet<String>,
    urls: HashSet<String>,
}

impl SeenKeys {
    fn from_records(records: &[ResultRecord], fields: &DedupFields) -> Self {
        let mut seen = SeenKeys::default();
        for record in records {
            seen.insert(record, fields);
        }
        seen
    }

    fn insert(&mut self, record: &ResultRecord, fields: &DedupFields) {
        let key = record.dedup_key(fields);
        if let Some(name) = key.name {
            self.names.insert(name);
        }
        if let Some(url) = key.url {
            self.urls.insert(url);
        }
    }

    /// Name OR url match marks a duplicate. Absent components never match.
    fn is_duplicate(&self, record: &ResultRecord, fields: &DedupFields) -> bool {
        let key = record.dedup_key(fields);
        key.name.is_some_and(|n| self.names.contains(&n))
            || key.url.is_some_and(|u| self.urls.contains(&u))
    }
}

/// Content-addressed store of result records, one file per category.
pub struct DedupStore {
    dir: PathBuf,
    fields: DedupFields,
    locks: Mutex<HashMap<Category, Arc<tokio::sync::Mutex<()>>>>,
}

impl DedupStore {
    pub fn new(dir: impl Into<PathBuf>, fields: DedupFields) -> Self {
        DedupStore {
            dir: dir.into(),
            fields,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn fields(&self) -> &DedupFields {
        &self.fields
    }

    /// Returns the backing file for `category`.
    pub fn path_for(&self, category: &Category) -> PathBuf {
        self.dir.join(format!("{}_vendors.json", category))
    }

    fn lock_for(&self, category: &Category) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(category.clone()).or_default())
    }

    /// Loads the stored records for `category`.
    ///
    /// Fails open: a missing, unreadable or malformed file yields an empty
    /// list after logging, so ingestion is never blocked.
    pub fn load_existing(&self, category: &Category) -> Vec<ResultRecord> {
        let path = self.path_for(category);
        match read_json_optional::<Vec<ResultRecord>>(&path) {
            Ok(records) => records.unwrap_or_default(),
            Err(e) => {
                warn!(
                    category = %category,
                    path = %path.display(),
                    error = %e,
                    "Failed to load stored records, treating store as empty"
                );
                Vec::new()
            }
        }
    }

    /// Returns the candidates that do not duplicate a stored record.
    ///
    /// Candidates are also checked against each other, so two candidates
    /// sharing a name or url yield only the first. Each returned record is
    /// stamped with `added_date` and `record_id`.
    pub fn filter_new(&self, candidates: Vec<ResultRecord>, category: &Category) -> Vec<ResultRecord> {
        let existing = self.load_existing(category);
        self.filter_against(&existing, candidates, category)
    }

    fn filter_against(
        &self,
        existing: &[ResultRecord],
        candidates: Vec<ResultRecord>,
        category: &Category,
    ) -> Vec<ResultRecord> {
        let mut seen = SeenKeys::from_records(existing, &self.fields);
        let total = candidates.len();
        let now = Utc::now().to_rfc3339();

        let fresh: Vec<ResultRecord> = candidates
            .into_iter()
            .filter_map(|mut record| {
                if seen.is_duplicate(&record, &self.fields) {
                    return None;
                }
                seen.insert(&record, &self.fields);
                let record_id = record.dedup_key(&self.fields).fingerprint();
                record.insert(ADDED_DATE_FIELD, now.clone());
                record.insert(RECORD_ID_FIELD, record_id);
                Some(record)
            })
            .collect();

        debug!(
            category = %category,
            candidates = total,
            new = fresh.len(),
            "Filtered candidates against stored records"
        );
        fresh
    }

    /// Appends `records` to the category's stored list.
    ///
    /// Read-modify-write under the category lock; the file is replaced
    /// atomically.
    pub async fn save(&self, records: &[ResultRecord], category: &Category) -> Result<(), PersistenceError> {
        if records.is_empty() {
            return Ok(());
        }
        let lock = self.lock_for(category);
        let _guard = lock.lock().await;
        let mut stored = self.load_existing(category);
        stored.extend(records.iter().cloned());
        self.write(category, &stored)
    }

    /// Filters `candidates` and saves the new ones in one critical section.
    ///
    /// Returns the records that were new. If the write fails the error is
    /// logged and the new records are still returned.
    pub async fn commit(&self, candidates: Vec<ResultRecord>, category: &Category) -> Vec<ResultRecord> {
        let lock = self.lock_for(category);
        let _guard = lock.lock().await;

        let mut stored = self.load_existing(category);
        let fresh = self.filter_against(&stored, candidates, category);
        if fresh.is_empty() {
            return fresh;
        }

        stored.extend(fresh.iter().cloned());
        match self.write(category, &stored) {
            Ok(()) => info!(
                category = %category,
                added = fresh.len(),
                stored = stored.len(),
                "Committed new records"
            ),
            Err(e) => warn!(
                category = %category,
                error = %e,
                "Failed to persist new records"
            ),
        }
        fresh
    }

    /// Returns the number of stored records for `category`.
    pub fn count(&self, category: &Category) -> usize {
        self.load_existing(category).len()
    }

    /// Returns every stored record for `category`.
    pub fn all_records(&self, category: &Category) -> Vec<ResultRecord> {
        self.load_existing(category)
    }

    fn write(&self, category: &Category, records: &[ResultRecord]) -> Result<(), PersistenceError> {
        write_json_atomic(&self.path_for(category), records)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn vendor(name: &str, url: &str) -> ResultRecord {
        ResultRecord::new()
            .with("company_name", name)
            .with("website", url)
    }

    fn category() -> Category {
        Category::parse("chiropractic").unwrap()
    }

    #[tokio::test]
    async fn filter_then_save_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = DedupStore::new(dir.path(), DedupFields::default());
        let candidates = vec![vendor("Acme", "a.com"), vendor("Bolt", "b.com")];

        let first = store.filter_new(candidates.clone(), &category());
        assert_eq!(first.len(), 2);
        store.save(&first, &category()).await.unwrap();

        let second = store.filter_new(candidates, &category());
        assert!(second.is_empty());
        assert_eq!(store.count(&category()), 2);
    }

    #[tokio::test]
    async fn name_match_alone_is_a_duplicate() {
        let dir = tempdir().unwrap();
        let store = DedupStore::new(dir.path(), DedupFields::default());
        store.save(&[vendor("Acme", "a.com")], &category()).await.unwrap();

        let fresh = store.filter_new(vec![vendor("Acme", "b.com")], &category());
        assert!(fresh.is_empty());

        let fresh = store.filter_new(vec![vendor("Other", "a.com")], &category());
        assert!(fresh.is_empty(), "url match alone is also a duplicate");
    }

    #[test]
    fn new_records_are_stamped() {
        let dir = tempdir().unwrap();
        let store = DedupStore::new(dir.path(), DedupFields::default());

        let fresh = store.filter_new(vec![vendor("Acme", "a.com")], &category());
        let record = &fresh[0];
        assert!(record.get_str(ADDED_DATE_FIELD).is_some());
        assert_eq!(record.get_str(RECORD_ID_FIELD).map(str::len), Some(64));
    }

    #[test]
    fn candidates_are_deduplicated_among_themselves() {
        let dir = tempdir().unwrap();
        let store = DedupStore::new(dir.path(), DedupFields::default());

        let fresh = store.filter_new(
            vec![vendor("Acme", "a.com"), vendor("Acme", "c.com"), vendor("Dyno", "d.com")],
            &category(),
        );
        assert_eq!(fresh.len(), 2);
    }

    #[test]
    fn records_without_key_fields_are_never_duplicates() {
        let dir = tempdir().unwrap();
        let store = DedupStore::new(dir.path(), DedupFields::default());

        let blank = ResultRecord::new().with("description", "no identity");
        let fresh = store.filter_new(vec![blank.clone(), blank], &category());
        assert_eq!(fresh.len(), 2);
    }

    #[test]
    fn malformed_store_fails_open() {
        let dir = tempdir().unwrap();
        let store = DedupStore::new(dir.path(), DedupFields::default());
        std::fs::write(store.path_for(&category()), "[{oops").unwrap();

        assert_eq!(store.count(&category()), 0);
        let fresh = store.filter_new(vec![vendor("Acme", "a.com")], &category());
        assert_eq!(fresh.len(), 1);
    }

    #[tokio::test]
    async fn categories_are_stored_separately() {
        let dir = tempdir().unwrap();
        let store = DedupStore::new(dir.path(), DedupFields::default());
        let optometry = Category::parse("optometry").unwrap();

        store.commit(vec![vendor("Acme", "a.com")], &category()).await;
        let fresh = store.commit(vec![vendor("Acme", "a.com")], &optometry).await;

        assert_eq!(fresh.len(), 1);
        assert!(store.path_for(&optometry).ends_with("optometry_vendors.json"));
        assert_eq!(store.count(&category()), 1);
        assert_eq!(store.count(&optometry), 1);
    }

    #[tokio::test]
    async fn concurrent_commits_to_one_category_do_not_lose_writes() {
        let dir = tempdir().unwrap();
        let store = Arc::new(DedupStore::new(dir.path(), DedupFields::default()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let name = format!("Vendor {i}");
                let url = format!("v{i}.com");
                store.commit(vec![vendor(&name, &url)], &category()).await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().len(), 1);
        }

        assert_eq!(store.count(&category()), 8);
    }
}
