//! Outcomes of units of work and the aggregated report of a batch.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ResultRecord, WorkItem};

/// Classification of a failed unit or task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The work did not finish within its deadline.
    Timeout,
    /// The response could not be parsed.
    ParseError,
    /// The response parsed but had the wrong shape.
    InvalidResponse,
    /// The response was valid but does not describe a relevant result.
    NotApplicable,
    /// Anything else.
    Other,
}

impl FailureKind {
    pub const ALL: [FailureKind; 5] = [
        FailureKind::Timeout,
        FailureKind::ParseError,
        FailureKind::InvalidResponse,
        FailureKind::NotApplicable,
        FailureKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::ParseError => "parse_error",
            FailureKind::InvalidResponse => "invalid_response",
            FailureKind::NotApplicable => "not_applicable",
            FailureKind::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure of one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct UnitFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl UnitFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        UnitFailure {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ParseError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidResponse, message)
    }

    pub fn not_applicable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotApplicable, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Other, message)
    }
}

/// What a unit function returns for one work item.
///
/// `Ok` with records is a success, `Ok` with no records is a failure without
/// an error, and `Err` is a failure with an error.
pub type UnitResult = Result<Vec<ResultRecord>, UnitFailure>;

/// Aggregated outcome of one `process_batch` call.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Records from every successful unit, in completion order.
    pub results: Vec<ResultRecord>,
    /// Items whose unit returned an error.
    pub errors: Vec<(WorkItem, UnitFailure)>,
    /// Items whose unit ran to completion, whatever the outcome.
    pub completed: Vec<WorkItem>,
    /// Items that were never started because the run was cancelled.
    pub skipped: Vec<WorkItem>,
    pub succeeded: usize,
    pub failed: usize,
    /// True if cancellation stopped the batch before every item ran.
    pub cancelled: bool,
}

impl BatchReport {
    /// Number of units that ran to completion.
    pub fn units(&self) -> usize {
        self.completed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kinds_serialize_as_snake_case() {
        let json = serde_json::to_string(&FailureKind::InvalidResponse).unwrap();
        assert_eq!(json, "\"invalid_response\"");
        for kind in FailureKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn unit_failure_display_includes_kind() {
        let failure = UnitFailure::timeout("no answer after 30s");
        assert_eq!(failure.to_string(), "timeout: no answer after 30s");
    }
}
