//! Interfaces to the external collaborators of a harvest.
//!
//! These are the seams where query generation, page evaluation and
//! reporting plug in. The engine treats all three as opaque.

use std::future::Future;

use thiserror::Error;

use crate::dispatch::UnitFailure;
use crate::types::{Category, ResultRecord};

/// Failure to generate tasks for a location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task generation failed: {0}")]
pub struct GenerateError(pub String);

/// Failure to export records.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence error: {0}")]
    Persistence(#[from] crate::persistence::PersistenceError),

    #[error("export command failed: {0}")]
    Command(String),
}

/// Produces the derived tasks (e.g. search queries) for one location.
pub trait WorkGenerator: Send + Sync {
    /// Generates up to `count` tasks for `location` in `category`.
    fn generate(
        &self,
        category: &Category,
        location: &str,
        count: usize,
    ) -> impl Future<Output = Result<Vec<String>, GenerateError>> + Send;
}

/// Evaluates one derived task into at most one record.
pub trait UnitEvaluator: Send + Sync {
    /// Returns `Ok(None)` when the task produced no structured result.
    fn evaluate(
        &self,
        task: &str,
        category: &Category,
        location: &str,
    ) -> impl Future<Output = Result<Option<ResultRecord>, UnitFailure>> + Send;
}

/// Bulk export of newly stored records to an external surface.
pub trait Exporter: Send + Sync {
    /// Returns a handle (path, URL, ...) for the export, if one was created.
    fn export(
        &self,
        category: &Category,
        records: &[ResultRecord],
    ) -> impl Future<Output = Result<Option<String>, ExportError>> + Send;
}
