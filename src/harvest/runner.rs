//! The per-category harvest loop.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::collaborators::{Exporter, UnitEvaluator, WorkGenerator};
use super::summary::{CategorySummary, RunSummary};
use super::unit::{UnitSettings, process_item};
use crate::catalog::{CatalogFilter, WorkCatalog};
use crate::dispatch::{Dispatcher, RunContext, UnitResult};
use crate::persistence::{DedupStore, ErrorLog, ProcessedSet, StateLayout};
use crate::types::{Category, ProcessedRecord, ResultRecord, WorkItem};

/// Default pause between batches.
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_secs(5);

/// Default number of batches between exports.
pub const DEFAULT_EXPORT_EVERY: usize = 10;

type UnitFuture = Pin<Box<dyn Future<Output = UnitResult> + Send>>;

/// Run-wide harvest behaviour.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    /// Catalog scope.
    pub filter: CatalogFilter,
    /// Revisit items already in the durable processed set.
    pub rescan: bool,
    pub batch_pause: Duration,
    /// Export new records every this many batches. Zero exports only at the
    /// end of each category.
    pub export_every: usize,
    pub unit: UnitSettings,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        HarvestSettings {
            filter: CatalogFilter::all(),
            rescan: false,
            batch_pause: DEFAULT_BATCH_PAUSE,
            export_every: DEFAULT_EXPORT_EVERY,
            unit: UnitSettings {
                tasks_per_item: super::DEFAULT_TASKS_PER_ITEM,
                retry: super::RetryConfig::DEFAULT,
            },
        }
    }
}

/// The external collaborators of a harvest.
pub struct Collaborators<G, E, X> {
    pub generator: G,
    pub evaluator: E,
    pub exporter: X,
}

/// Drives batches through the dispatcher and commits their results.
///
/// Per batch: select unprocessed items, dispatch them, commit new records
/// to the dedup store, journal the errors, then mark the completed items as
/// processed. Marking last keeps processing at-least-once.
pub struct Harvester<G, E, X> {
    catalog: Arc<WorkCatalog>,
    dispatcher: Dispatcher,
    dedup: Arc<DedupStore>,
    layout: StateLayout,
    ctx: Arc<RunContext>,
    generator: Arc<G>,
    evaluator: Arc<E>,
    exporter: X,
    settings: HarvestSettings,
}

impl<G, E, X> Harvester<G, E, X>
where
    G: WorkGenerator + 'static,
    E: UnitEvaluator + 'static,
    X: Exporter,
{
    pub fn new(
        catalog: Arc<WorkCatalog>,
        dispatcher: Dispatcher,
        dedup: Arc<DedupStore>,
        layout: StateLayout,
        ctx: Arc<RunContext>,
        collaborators: Collaborators<G, E, X>,
        settings: HarvestSettings,
    ) -> Self {
        Harvester {
            catalog,
            dispatcher,
            dedup,
            layout,
            ctx,
            generator: Arc::new(collaborators.generator),
            evaluator: Arc::new(collaborators.evaluator),
            exporter: collaborators.exporter,
            settings,
        }
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Runs each category in turn until done or cancelled.
    pub async fn run(&self, categories: &[Category]) -> RunSummary {
        let mut summaries = Vec::with_capacity(categories.len());
        for category in categories {
            if self.ctx.is_cancelled() {
                break;
            }
            summaries.push(self.run_category(category).await);
        }
        self.ctx.set_current_category(None);

        RunSummary {
            categories: summaries,
            progress: self.dispatcher.progress(),
            breakdown: self.ctx.breakdown(),
            cancelled: self.ctx.is_cancelled(),
        }
    }

    /// Processes every remaining item of one category.
    #[instrument(skip(self, category), fields(category = %category))]
    pub async fn run_category(&self, category: &Category) -> CategorySummary {
        self.ctx.set_current_category(Some(category.clone()));

        let filter = &self.settings.filter;
        let processed = self.open_processed(category);
        let mut error_log = self.open_error_log(category);
        let mut this_run: HashSet<ProcessedRecord> = HashSet::new();
        let mut pending_export: Vec<ResultRecord> = Vec::new();
        let mut summary = CategorySummary::new(category.clone(), self.catalog.total_count(filter));

        info!(
            scope = %filter,
            total = summary.total,
            remaining = self.catalog.remaining_count(filter, &processed),
            rescan = self.settings.rescan,
            "Starting category"
        );

        loop {
            if self.ctx.is_cancelled() {
                break;
            }

            let batch = if self.settings.rescan {
                self.catalog.next_batch(filter, &this_run)
            } else {
                self.catalog.next_batch(filter, &processed)
            };
            if batch.is_empty() {
                summary.complete = true;
                break;
            }
            summary.batches += 1;
            debug!(batch = summary.batches, items = batch.len(), "Dispatching batch");

            let mut report = self
                .dispatcher
                .process_batch(&self.ctx, batch, self.unit_fn(category))
                .await;
            summary.absorb(&report);

            let fresh = self.dedup.commit(std::mem::take(&mut report.results), category).await;
            summary.new_records += fresh.len();
            pending_export.extend(fresh);

            if let Some(log) = error_log.as_mut()
                && let Err(e) = log.append_all(&report.errors)
            {
                warn!(error = %e, "Failed to journal unit errors");
            }

            for item in &report.completed {
                let record = item.processed_record();
                if let Err(e) = processed.mark_processed(&record) {
                    warn!(item = %item, error = %e, "Failed to persist processed mark");
                }
                this_run.insert(record);
            }

            if self.settings.export_every > 0 && summary.batches % self.settings.export_every == 0 {
                self.export(category, &mut pending_export, &mut summary).await;
            }

            info!(
                batch = summary.batches,
                succeeded = report.succeeded,
                failed = report.failed,
                new_records = summary.new_records,
                progress_percent = self.catalog.progress_percent(filter, &processed),
                "Batch committed"
            );

            if report.cancelled {
                break;
            }
            if !self.settings.batch_pause.is_zero() {
                tokio::select! {
                    _ = self.ctx.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.batch_pause) => {}
                }
            }
        }

        self.export(category, &mut pending_export, &mut summary).await;
        summary.remaining = self.catalog.remaining_count(filter, &processed);

        info!(
            batches = summary.batches,
            units = summary.units,
            new_records = summary.new_records,
            remaining = summary.remaining,
            complete = summary.complete,
            "Category finished"
        );
        summary
    }

    fn unit_fn(&self, category: &Category) -> impl Fn(WorkItem) -> UnitFuture + Send + Sync + 'static {
        let generator = Arc::clone(&self.generator);
        let evaluator = Arc::clone(&self.evaluator);
        let ctx = Arc::clone(&self.ctx);
        let settings = self.settings.unit.clone();
        let category = category.clone();

        move |item: WorkItem| -> UnitFuture {
            let generator = Arc::clone(&generator);
            let evaluator = Arc::clone(&evaluator);
            let ctx = Arc::clone(&ctx);
            let settings = settings.clone();
            let category = category.clone();
            Box::pin(async move {
                process_item(&*generator, &*evaluator, &ctx, &settings, &category, &item).await
            })
        }
    }

    fn open_processed(&self, category: &Category) -> ProcessedSet {
        let path = self.layout.processed_path(category);
        ProcessedSet::load(&path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Failed to load processed set; progress will not persist");
            ProcessedSet::in_memory()
        })
    }

    fn open_error_log(&self, category: &Category) -> Option<ErrorLog> {
        let path = self.layout.errors_path(category);
        match ErrorLog::open(&path) {
            Ok(log) => Some(log),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to open error log");
                None
            }
        }
    }

    /// Exports pending records. They are kept for the next attempt if the
    /// export fails.
    async fn export(&self, category: &Category, pending: &mut Vec<ResultRecord>, summary: &mut CategorySummary) {
        if pending.is_empty() {
            return;
        }
        match self.exporter.export(category, pending).await {
            Ok(handle) => {
                summary.exports.extend(handle);
                pending.clear();
            }
            Err(e) => warn!(records = pending.len(), error = %e, "Export failed"),
        }
    }
}
