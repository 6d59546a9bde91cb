//! Core domain types for the harvester.
//!
//! Identity rules live on the types themselves: work items compare by
//! `(state, city)`, records by their dedup key.

pub mod ids;
pub mod record;
pub mod work_item;

pub use ids::{Category, DEFAULT_CATEGORIES, InvalidCategory};
pub use record::{
    ADDED_DATE_FIELD, DEFAULT_NAME_FIELD, DEFAULT_URL_FIELD, DedupFields, DedupKey,
    RECORD_ID_FIELD, ResultRecord,
};
pub use work_item::{ProcessedRecord, WorkItem};
