//! Shared state for one harvest run.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::outcome::FailureKind;
use crate::types::Category;

/// Failure counts by kind, for units and for the tasks inside them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailureBreakdown {
    pub units: BTreeMap<FailureKind, u64>,
    pub tasks: BTreeMap<FailureKind, u64>,
}

impl FailureBreakdown {
    pub fn record_unit(&mut self, kind: FailureKind) {
        *self.units.entry(kind).or_default() += 1;
    }

    pub fn record_task(&mut self, kind: FailureKind) {
        *self.tasks.entry(kind).or_default() += 1;
    }

    pub fn total_units(&self) -> u64 {
        self.units.values().sum()
    }

    pub fn total_tasks(&self) -> u64 {
        self.tasks.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.tasks.is_empty()
    }
}

/// Run-scoped context handed to the dispatcher and every worker.
///
/// Holds the cancellation flag, the failure breakdown, and the category
/// currently being processed. It is constructed by the caller and shared by
/// reference, never a global.
#[derive(Debug, Default)]
pub struct RunContext {
    cancel: CancellationToken,
    breakdown: Mutex<FailureBreakdown>,
    current: Mutex<Option<Category>>,
}

impl RunContext {
    pub fn new(cancel: CancellationToken) -> Self {
        RunContext {
            cancel,
            breakdown: Mutex::new(FailureBreakdown::default()),
            current: Mutex::new(None),
        }
    }

    /// Returns a clone of the cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Requests that no new units start.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when cancellation is requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn record_unit_failure(&self, kind: FailureKind) {
        self.breakdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_unit(kind);
    }

    pub fn record_task_failure(&self, kind: FailureKind) {
        self.breakdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_task(kind);
    }

    /// Returns a snapshot of the failure breakdown.
    pub fn breakdown(&self) -> FailureBreakdown {
        self.breakdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_current_category(&self, category: Option<Category>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = category;
    }

    pub fn current_category(&self) -> Option<Category> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
