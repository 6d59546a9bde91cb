//! Hierarchical filters over the catalog.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::WorkItem;

/// Optional equality constraints on a work item's state and city.
///
/// Matching is case-insensitive. Empty or whitespace-only constraints are
/// treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFilter {
    pub state: Option<String>,
    pub city: Option<String>,
}

impl CatalogFilter {
    /// A filter that matches every item.
    pub fn all() -> Self {
        CatalogFilter::default()
    }

    pub fn new(state: Option<String>, city: Option<String>) -> Self {
        CatalogFilter {
            state: normalize(state),
            city: normalize(city),
        }
    }

    pub fn state(state: impl Into<String>) -> Self {
        CatalogFilter::new(Some(state.into()), None)
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = normalize(Some(city.into()));
        self
    }

    /// Returns true if the item satisfies every present constraint.
    pub fn matches(&self, item: &WorkItem) -> bool {
        matches_key(self.state.as_deref(), &item.state)
            && matches_key(self.city.as_deref(), &item.city)
    }

    pub fn is_unconstrained(&self) -> bool {
        self.state.is_none() && self.city.is_none()
    }
}

impl fmt::Display for CatalogFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "state={} city={}",
            self.state.as_deref().unwrap_or("*"),
            self.city.as_deref().unwrap_or("*")
        )
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Case-insensitive comparison; an absent constraint matches anything.
pub(crate) fn matches_key(constraint: Option<&str>, value: &str) -> bool {
    match constraint {
        None => true,
        Some(c) => c.to_lowercase() == value.to_lowercase(),
    }
}
