//! Bounded-concurrency execution of one batch of work items.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use super::context::RunContext;
use super::outcome::{BatchReport, UnitFailure, UnitResult};
use crate::limiter::RateLimiter;
use crate::persistence::{ProgressCounters, ProgressStore};
use crate::types::WorkItem;

/// Default number of units run concurrently.
pub const DEFAULT_MAX_WORKERS: usize = 10;

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound on concurrently running units. Zero is treated as one.
    pub max_workers: usize,
}

impl DispatcherConfig {
    pub fn new(max_workers: usize) -> Self {
        DispatcherConfig {
            max_workers: max_workers.max(1),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig::new(DEFAULT_MAX_WORKERS)
    }
}

/// How a spawned unit ended.
enum UnitRun {
    Finished(WorkItem, UnitResult),
    /// Cancelled before the unit function was called.
    Skipped(WorkItem),
}

/// Runs units of work on a fixed-size pool, gated by a shared rate limiter.
///
/// Every finished unit, whatever its outcome, updates the progress counters
/// and flushes them before the next unit is accounted for.
pub struct Dispatcher {
    config: DispatcherConfig,
    limiter: Arc<RateLimiter>,
    progress: Arc<ProgressStore>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, limiter: Arc<RateLimiter>, progress: Arc<ProgressStore>) -> Self {
        info!(max_workers = config.max_workers, "Creating dispatcher");
        Dispatcher {
            config,
            limiter,
            progress,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Returns a snapshot of the progress counters.
    pub fn progress(&self) -> ProgressCounters {
        self.progress.snapshot()
    }

    /// Processes `items`, running at most `max_workers` units at once.
    ///
    /// Each unit waits for a rate-limit permit and then calls `unit_fn`.
    /// Cancellation is checked before each item is dispatched and again
    /// before its unit starts; units already running are allowed to finish
    /// and their outcomes are included in the report.
    #[instrument(skip_all, fields(items = items.len(), max_workers = self.config.max_workers))]
    pub async fn process_batch<F, Fut>(&self, ctx: &RunContext, items: Vec<WorkItem>, unit_fn: F) -> BatchReport
    where
        F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = UnitResult> + Send + 'static,
    {
        let unit_fn = Arc::new(unit_fn);
        let slots = Arc::new(Semaphore::new(self.config.max_workers));
        let mut tasks: JoinSet<UnitRun> = JoinSet::new();
        let mut in_flight: HashMap<task::Id, WorkItem> = HashMap::new();
        let mut report = BatchReport::default();

        let mut pending = items.into_iter();
        while let Some(item) = pending.next() {
            if ctx.is_cancelled() {
                report.skipped.push(item);
                break;
            }

            let permit = tokio::select! {
                biased;

                _ = ctx.cancelled() => {
                    report.skipped.push(item);
                    break;
                }
                permit = Arc::clone(&slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        report.skipped.push(item);
                        break;
                    }
                },
            };

            let limiter = Arc::clone(&self.limiter);
            let progress = Arc::clone(&self.progress);
            let unit_fn = Arc::clone(&unit_fn);
            let cancel = ctx.cancel_token();
            let task_item = item.clone();

            let handle = tasks.spawn(async move {
                let _permit = permit;

                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => return UnitRun::Skipped(task_item),
                    _ = limiter.acquire() => {}
                }
                if cancel.is_cancelled() {
                    return UnitRun::Skipped(task_item);
                }

                debug!(item = %task_item, "Starting unit");
                let outcome = unit_fn(task_item.clone()).await;
                match &outcome {
                    Ok(records) if !records.is_empty() => progress.record_success(),
                    _ => progress.record_failure(),
                };
                UnitRun::Finished(task_item, outcome)
            });
            in_flight.insert(handle.id(), item);
        }

        if ctx.is_cancelled() {
            report.cancelled = true;
            report.skipped.extend(pending);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, run)) => {
                    in_flight.remove(&id);
                    self.absorb(ctx, &mut report, run);
                }
                Err(join_error) => {
                    let Some(item) = in_flight.remove(&join_error.id()) else {
                        continue;
                    };
                    error!(item = %item, error = %join_error, "Unit task did not complete");
                    self.progress.record_failure();
                    let failure = UnitFailure::other(format!("unit task failed: {join_error}"));
                    self.absorb(ctx, &mut report, UnitRun::Finished(item, Err(failure)));
                }
            }
        }

        if !report.skipped.is_empty() {
            report.cancelled = true;
        }

        info!(
            completed = report.units(),
            succeeded = report.succeeded,
            failed = report.failed,
            errors = report.errors.len(),
            records = report.results.len(),
            skipped = report.skipped.len(),
            cancelled = report.cancelled,
            "Batch finished"
        );
        report
    }

    fn absorb(&self, ctx: &RunContext, report: &mut BatchReport, run: UnitRun) {
        match run {
            UnitRun::Skipped(item) => report.skipped.push(item),
            UnitRun::Finished(item, Ok(records)) if !records.is_empty() => {
                debug!(item = %item, records = records.len(), "Unit succeeded");
                report.succeeded += 1;
                report.results.extend(records);
                report.completed.push(item);
            }
            UnitRun::Finished(item, Ok(_)) => {
                debug!(item = %item, "Unit produced no records");
                report.failed += 1;
                report.completed.push(item);
            }
            UnitRun::Finished(item, Err(failure)) => {
                warn!(item = %item, kind = %failure.kind, error = %failure.message, "Unit failed");
                ctx.record_unit_failure(failure.kind);
                report.failed += 1;
                report.completed.push(item.clone());
                report.errors.push((item, failure));
            }
        }
    }
}
