//! Work items: the addressable locations a harvest iterates over.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// One location in the catalog.
///
/// The identity of a work item is the `(state, city)` pair. The zip code is a
/// single representative value kept for display and query generation; it does
/// not take part in equality or hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Primary key, e.g. `"CA"`.
    pub state: String,
    /// Secondary key, e.g. `"Fresno"`.
    pub city: String,
    /// Informational tertiary key.
    pub zip_code: String,
}

impl WorkItem {
    pub fn new(
        state: impl Into<String>,
        city: impl Into<String>,
        zip_code: impl Into<String>,
    ) -> Self {
        WorkItem {
            state: state.into(),
            city: city.into(),
            zip_code: zip_code.into(),
        }
    }

    /// Returns the display label, `"<city>, <state> <zip>"`.
    pub fn label(&self) -> String {
        self.to_string()
    }

    /// Returns the record written to a processed set once this item completes.
    pub fn processed_record(&self) -> ProcessedRecord {
        ProcessedRecord(self.label())
    }
}

impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state && self.city == other.city
    }
}

impl Eq for WorkItem {}

impl Hash for WorkItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.state.hash(state);
        self.city.hash(state);
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {} {}", self.city, self.state, self.zip_code)
    }
}

/// The durable identity of a completed work item (its label).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessedRecord(pub String);

impl ProcessedRecord {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProcessedRecord {
    fn from(s: String) -> Self {
        ProcessedRecord(s)
    }
}

impl From<&str> for ProcessedRecord {
    fn from(s: &str) -> Self {
        ProcessedRecord(s.to_string())
    }
}
