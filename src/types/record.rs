//! Result records and the keys used to deduplicate them.
//!
//! A [`ResultRecord`] is an arbitrary JSON object produced by evaluating one
//! task. Two records describe the same real-world vendor when their
//! [`DedupKey`]s share either a name or a url.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Default field holding a record's canonical name.
pub const DEFAULT_NAME_FIELD: &str = "company_name";

/// Default field holding a record's canonical url.
pub const DEFAULT_URL_FIELD: &str = "website";

/// Field stamped with the ingestion timestamp when a record is first stored.
pub const ADDED_DATE_FIELD: &str = "added_date";

/// Field stamped with the record's content address when first stored.
pub const RECORD_ID_FIELD: &str = "record_id";

/// A structured result produced by evaluating one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRecord(pub Map<String, Value>);

impl ResultRecord {
    pub fn new() -> Self {
        ResultRecord(Map::new())
    }

    /// Converts a JSON value into a record, if it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(ResultRecord(map)),
            _ => None,
        }
    }

    /// Sets a field, returning the record for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a field as a non-empty string.
    ///
    /// Missing, null, non-string and empty values all yield `None`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// Extracts this record's dedup key.
    pub fn dedup_key(&self, fields: &DedupFields) -> DedupKey {
        DedupKey {
            name: self.get_str(&fields.name_field).map(str::to_string),
            url: self.get_str(&fields.url_field).map(str::to_string),
        }
    }
}

impl From<Map<String, Value>> for ResultRecord {
    fn from(map: Map<String, Value>) -> Self {
        ResultRecord(map)
    }
}

/// Which record fields form the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupFields {
    pub name_field: String,
    pub url_field: String,
}

impl DedupFields {
    pub fn new(name_field: impl Into<String>, url_field: impl Into<String>) -> Self {
        DedupFields {
            name_field: name_field.into(),
            url_field: url_field.into(),
        }
    }
}

impl Default for DedupFields {
    fn default() -> Self {
        DedupFields::new(DEFAULT_NAME_FIELD, DEFAULT_URL_FIELD)
    }
}

/// The identity components of a record.
///
/// Either component may be absent. An absent component never matches
/// anything, so a record with neither is never considered a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub name: Option<String>,
    pub url: Option<String>,
}

impl DedupKey {
    pub fn new(name: Option<String>, url: Option<String>) -> Self {
        DedupKey { name, url }
    }

    /// Returns true if the key has neither a name nor a url.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.url.is_none()
    }

    /// Returns the SHA-256 content address of this key as lowercase hex.
    ///
    /// Components are length-prefixed so that `("ab", "c")` and `("a", "bc")`
    /// hash differently.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [&self.name, &self.url] {
            match part {
                Some(s) => {
                    hasher.update((s.len() as u64).to_le_bytes());
                    hasher.update(s.as_bytes());
                }
                None => hasher.update(u64::MAX.to_le_bytes()),
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name={} url={}",
            self.name.as_deref().unwrap_or("-"),
            self.url.as_deref().unwrap_or("-")
        )
    }
}
