//! The location catalog: the full addressable domain of work items.
//!
//! The catalog is loaded once from a JSON file of the form
//!
//! ```text
//! { "<state>": { "<city>": ["<zip>", ...], ... }, ... }
//! ```
//!
//! and is immutable afterwards. Batches are produced lazily by asking for the
//! next `batch_size` items that match a [`CatalogFilter`] and are absent from a
//! processed set, so a restarted run picks up exactly where the durable
//! processed set says it left off.

mod filter;
mod work_catalog;

pub use filter::CatalogFilter;
pub use work_catalog::{CatalogError, DEFAULT_BATCH_SIZE, ProcessedLookup, WorkCatalog};
