//! Harvest orchestration: turning catalog batches into stored records.
//!
//! A [`Harvester`] owns the per-category loop. Each work item is one unit of
//! work: its tasks come from a [`WorkGenerator`] (retried with backoff,
//! falling back to [`FALLBACK_TEMPLATES`]) and each task is evaluated by a
//! [`UnitEvaluator`]. New records are exported through an [`Exporter`].
//!
//! # Module Structure
//!
//! - [`collaborators`]: the three collaborator traits
//! - [`retry`]: backoff and templated fallback for generation
//! - [`unit`]: the per-item unit of work
//! - [`command`]: collaborators backed by shell commands
//! - [`export`]: the default JSON file exporter
//! - [`runner`]: the batch loop
//! - [`summary`]: run reporting

pub mod collaborators;
pub mod command;
pub mod export;
pub mod retry;
pub mod runner;
pub mod summary;
pub mod templates;
pub mod unit;

use std::io;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;

pub use collaborators::{ExportError, Exporter, GenerateError, UnitEvaluator, WorkGenerator};
pub use command::{CommandEvaluator, CommandGenerator, DEFAULT_TASK_TIMEOUT};
pub use export::JsonFileExporter;
pub use retry::{RetryConfig, TaskSource, generate_with_fallback};
pub use runner::{
    Collaborators, DEFAULT_BATCH_PAUSE, DEFAULT_EXPORT_EVERY, HarvestSettings, Harvester,
};
pub use summary::{CategorySummary, RunSummary};
pub use templates::{FALLBACK_TEMPLATES, TemplateGenerator, fallback_tasks};
pub use unit::{UnitSettings, process_item};

/// Default number of tasks generated per work item.
pub const DEFAULT_TASKS_PER_ITEM: usize = 5;

/// Fatal errors that stop a harvest before it starts.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to listen on {addr}: {source}")]
    Listen { addr: String, source: io::Error },
}
