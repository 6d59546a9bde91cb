//! Newtype wrappers for domain identifiers.
//!
//! Categories double as file name components in the state directory, so they
//! are validated on construction and can never contain path separators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The categories collected when none are configured explicitly.
pub const DEFAULT_CATEGORIES: [&str; 3] = ["chiropractic", "optometry", "auto-repair"];

/// Error returned when a string is not a valid category name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid category name {0:?}: expected lowercase letters, digits, '-' or '_'")]
pub struct InvalidCategory(pub String);

/// An industry category that results are collected and stored under.
///
/// Valid names are non-empty, at most 64 characters, and consist of ASCII
/// lowercase letters, digits, `-` and `_`. Input is trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Category(String);

impl Category {
    /// Parses and normalizes a category name.
    pub fn parse(s: impl AsRef<str>) -> Result<Self, InvalidCategory> {
        let normalized = s.as_ref().trim().to_ascii_lowercase();
        let valid = !normalized.is_empty()
            && normalized.len() <= 64
            && normalized
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');

        if valid {
            Ok(Category(normalized))
        } else {
            Err(InvalidCategory(s.as_ref().to_string()))
        }
    }

    /// Returns the category as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the built-in default categories.
    pub fn defaults() -> Vec<Category> {
        DEFAULT_CATEGORIES
            .iter()
            .map(|name| Category((*name).to_string()))
            .collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Category {
    type Err = InvalidCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::parse(s)
    }
}

impl TryFrom<String> for Category {
    type Error = InvalidCategory;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Category::parse(s)
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.0
    }
}
