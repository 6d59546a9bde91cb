//! The static location catalog and its batch/progress views.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info};

use super::filter::{CatalogFilter, matches_key};
use crate::types::{ProcessedRecord, WorkItem};

/// Default number of items per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Errors that can occur while loading the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog file does not exist.
    #[error("catalog file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The catalog file could not be read.
    #[error("failed to read catalog {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The catalog file is not a `{state: {city: [zip, ...]}}` JSON object.
    #[error("malformed catalog {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Raw catalog layout: state -> city -> zip codes, in file order.
type RawCatalog = IndexMap<String, IndexMap<String, Vec<String>>>;

/// Lookup for items that have already been completed.
///
/// Implemented by the durable processed set and by plain in-memory sets.
pub trait ProcessedLookup {
    fn contains_record(&self, record: &ProcessedRecord) -> bool;
}

impl ProcessedLookup for HashSet<ProcessedRecord> {
    fn contains_record(&self, record: &ProcessedRecord) -> bool {
        self.contains(record)
    }
}

/// The full, ordered set of work items.
///
/// Items are unique by `(state, city)`. Every view preserves catalog order.
#[derive(Debug, Clone)]
pub struct WorkCatalog {
    items: Vec<WorkItem>,
    raw: RawCatalog,
    batch_size: usize,
}

impl WorkCatalog {
    /// Loads the catalog from a JSON file.
    ///
    /// Cities with an empty zip list are skipped; the first listed zip is the
    /// item's representative zip code.
    pub fn load(path: impl AsRef<Path>, batch_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CatalogError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(source) => {
                return Err(CatalogError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let raw: RawCatalog =
            serde_json::from_slice(&bytes).map_err(|source| CatalogError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        let catalog = Self::from_raw(raw, batch_size);
        info!(
            path = %path.display(),
            items = catalog.items.len(),
            states = catalog.raw.len(),
            "Loaded location catalog"
        );
        Ok(catalog)
    }

    /// Builds a catalog from explicit items, dropping later duplicates.
    pub fn from_items(items: impl IntoIterator<Item = WorkItem>, batch_size: usize) -> Self {
        let mut raw = RawCatalog::new();
        for item in items {
            raw.entry(item.state.clone())
                .or_default()
                .entry(item.city.clone())
                .or_default()
                .push(item.zip_code);
        }
        Self::from_raw(raw, batch_size)
    }

    fn from_raw(raw: RawCatalog, batch_size: usize) -> Self {
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for (state, cities) in &raw {
            for (city, zips) in cities {
                let Some(zip) = zips.first() else {
                    continue;
                };
                let item = WorkItem::new(state, city, zip);
                if seen.insert(item.clone()) {
                    items.push(item);
                }
            }
        }

        WorkCatalog {
            items,
            raw,
            batch_size: batch_size.max(1),
        }
    }

    /// Returns the configured batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns every item in catalog order.
    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    /// Iterates over the items matching `filter`, in catalog order.
    pub fn filtered<'a>(&'a self, filter: &'a CatalogFilter) -> impl Iterator<Item = &'a WorkItem> {
        self.items.iter().filter(move |item| filter.matches(item))
    }

    /// Returns the items matching `filter`, in catalog order.
    pub fn filter(&self, filter: &CatalogFilter) -> Vec<WorkItem> {
        self.filtered(filter).cloned().collect()
    }

    /// Returns the next batch of at most `batch_size` unprocessed items.
    ///
    /// An empty batch means the filtered catalog is exhausted.
    pub fn next_batch(
        &self,
        filter: &CatalogFilter,
        processed: &impl ProcessedLookup,
    ) -> Vec<WorkItem> {
        let batch: Vec<WorkItem> = self
            .filtered(filter)
            .filter(|item| !processed.contains_record(&item.processed_record()))
            .take(self.batch_size)
            .cloned()
            .collect();
        debug!(size = batch.len(), %filter, "Providing batch");
        batch
    }

    /// Number of items matching `filter`.
    pub fn total_count(&self, filter: &CatalogFilter) -> usize {
        self.filtered(filter).count()
    }

    /// Number of items matching `filter` that are not yet processed.
    pub fn remaining_count(&self, filter: &CatalogFilter, processed: &impl ProcessedLookup) -> usize {
        self.filtered(filter)
            .filter(|item| !processed.contains_record(&item.processed_record()))
            .count()
    }

    /// Percentage of the filtered items already processed, `0.0` when empty.
    pub fn progress_percent(&self, filter: &CatalogFilter, processed: &impl ProcessedLookup) -> f64 {
        let total = self.total_count(filter);
        if total == 0 {
            return 0.0;
        }
        let remaining = self.remaining_count(filter, processed);
        (total - remaining) as f64 / total as f64 * 100.0
    }

    /// Returns all states in catalog order.
    pub fn states(&self) -> Vec<&str> {
        self.raw.keys().map(String::as_str).collect()
    }

    /// Returns the cities of a state (case-insensitive), in catalog order.
    pub fn cities(&self, state: &str) -> Vec<&str> {
        self.raw
            .iter()
            .filter(|(s, _)| matches_key(Some(state), s))
            .flat_map(|(_, cities)| cities.keys().map(String::as_str))
            .collect()
    }

    /// Returns every zip code listed for a city (case-insensitive).
    pub fn zip_codes(&self, state: &str, city: &str) -> Vec<&str> {
        self.raw
            .iter()
            .filter(|(s, _)| matches_key(Some(state), s))
            .flat_map(|(_, cities)| cities.iter())
            .filter(|(c, _)| matches_key(Some(city), c))
            .flat_map(|(_, zips)| zips.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn sample() -> WorkCatalog {
        WorkCatalog::from_items(
            [
                WorkItem::new("StateX", "CityA", "1"),
                WorkItem::new("StateX", "CityB", "2"),
                WorkItem::new("StateY", "CityA", "3"),
            ],
            10,
        )
    }

    fn done(items: &[&WorkItem]) -> HashSet<ProcessedRecord> {
        items.iter().map(|i| i.processed_record()).collect()
    }

    #[test]
    fn filter_by_state_preserves_order() {
        let catalog = sample();
        let filtered = catalog.filter(&CatalogFilter::state("StateX"));
        assert_eq!(
            filtered,
            vec![
                WorkItem::new("StateX", "CityA", "1"),
                WorkItem::new("StateX", "CityB", "2"),
            ]
        );
    }

    #[test]
    fn remaining_count_after_marking() {
        let catalog = sample();
        let filter = CatalogFilter::state("StateX");
        let processed = done(&[&catalog.items()[0]]);

        assert_eq!(catalog.total_count(&filter), 2);
        assert_eq!(catalog.remaining_count(&filter, &processed), 1);
        assert_eq!(catalog.progress_percent(&filter, &processed), 50.0);
    }

    #[test]
    fn next_batch_skips_processed_and_respects_size() {
        let items: Vec<WorkItem> = (0..25)
            .map(|i| WorkItem::new("S", format!("C{i}"), "0"))
            .collect();
        let catalog = WorkCatalog::from_items(items.clone(), 10);
        let processed = done(&[&items[0], &items[3]]);

        let batch = catalog.next_batch(&CatalogFilter::all(), &processed);
        assert_eq!(batch.len(), 10);
        assert_eq!(batch[0], items[1]);
        assert!(!batch.contains(&items[3]));
    }

    #[test]
    fn exhausted_catalog_returns_empty_batch() {
        let catalog = sample();
        let all: Vec<&WorkItem> = catalog.items().iter().collect();
        let processed = done(&all);
        assert!(catalog.next_batch(&CatalogFilter::all(), &processed).is_empty());
        assert_eq!(catalog.progress_percent(&CatalogFilter::all(), &processed), 100.0);
    }

    #[test]
    fn empty_catalog_has_zero_progress() {
        let catalog = WorkCatalog::from_items([], 10);
        let processed = HashSet::new();
        assert_eq!(catalog.total_count(&CatalogFilter::all()), 0);
        assert_eq!(catalog.progress_percent(&CatalogFilter::all(), &processed), 0.0);
    }

    #[test]
    fn duplicates_keep_first_representative() {
        let catalog = WorkCatalog::from_items(
            [
                WorkItem::new("CA", "Fresno", "93650"),
                WorkItem::new("CA", "Fresno", "93701"),
            ],
            10,
        );
        assert_eq!(catalog.items().len(), 1);
        assert_eq!(catalog.items()[0].zip_code, "93650");
        assert_eq!(catalog.zip_codes("ca", "fresno"), vec!["93650", "93701"]);
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        let catalog = WorkCatalog::from_items([WorkItem::new("S", "C", "0")], 0);
        assert_eq!(catalog.batch_size(), 1);
    }

    #[test]
    fn load_reads_json_in_file_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"NY": {{"Albany": ["12201", "12202"], "Empty": []}}, "CA": {{"Fresno": ["93650"]}}}}"#
        )
        .unwrap();
        drop(file);

        let catalog = WorkCatalog::load(&path, 5).unwrap();
        assert_eq!(catalog.states(), vec!["NY", "CA"]);
        assert_eq!(catalog.cities("ny"), vec!["Albany", "Empty"]);
        assert_eq!(
            catalog.items(),
            &[
                WorkItem::new("NY", "Albany", "12201"),
                WorkItem::new("CA", "Fresno", "93650"),
            ]
        );
        assert_eq!(catalog.items()[0].label(), "Albany, NY 12201");
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = WorkCatalog::load(dir.path().join("missing.json"), 5).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[test]
    fn load_malformed_file_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, r#"{"NY": ["not", "a", "map"]}"#).unwrap();
        let err = WorkCatalog::load(&path, 5).unwrap_err();
        assert!(matches!(err, CatalogError::Malformed { .. }));
    }

    fn arb_items() -> impl Strategy<Value = Vec<WorkItem>> {
        prop::collection::vec(
            ("[A-C]", "[a-e]", "[0-9]{5}").prop_map(|(s, c, z)| WorkItem::new(s, c, z)),
            0..40,
        )
    }

    proptest! {
        #[test]
        fn counts_agree_with_filter(
            items in arb_items(),
            state in prop::option::of("[A-Ca-c]"),
            marks in prop::collection::vec(any::<prop::sample::Index>(), 0..20),
        ) {
            let catalog = WorkCatalog::from_items(items, 7);
            let filter = CatalogFilter::new(state, None);
            let processed: HashSet<ProcessedRecord> = if catalog.items().is_empty() {
                HashSet::new()
            } else {
                marks
                    .iter()
                    .map(|ix| ix.get(catalog.items()).processed_record())
                    .collect()
            };

            let filtered = catalog.filter(&filter);
            prop_assert_eq!(catalog.total_count(&filter), filtered.len());

            let done_in_scope = filtered
                .iter()
                .filter(|i| processed.contains(&i.processed_record()))
                .count();
            prop_assert_eq!(
                catalog.remaining_count(&filter, &processed),
                filtered.len() - done_in_scope
            );
        }

        #[test]
        fn progress_is_monotonic_as_batches_complete(items in arb_items()) {
            let catalog = WorkCatalog::from_items(items, 3);
            let filter = CatalogFilter::all();
            let mut processed = HashSet::new();
            let mut last = catalog.progress_percent(&filter, &processed);

            loop {
                let batch = catalog.next_batch(&filter, &processed);
                if batch.is_empty() {
                    break;
                }
                for item in batch {
                    processed.insert(item.processed_record());
                    let now = catalog.progress_percent(&filter, &processed);
                    prop_assert!(now >= last);
                    last = now;
                }
            }
            prop_assert_eq!(catalog.remaining_count(&filter, &processed), 0);
        }
    }
}
