//! The unit of work for one location: generate tasks, evaluate each one.

use serde_json::Value;
use tracing::{debug, trace};

use super::collaborators::{UnitEvaluator, WorkGenerator};
use super::retry::{RetryConfig, generate_with_fallback};
use crate::dispatch::{FailureKind, RunContext, UnitFailure, UnitResult};
use crate::types::{Category, ResultRecord, WorkItem};

/// Field a record sets to `false` to say it is not a relevant result.
pub const RELEVANCE_FIELD: &str = "is_vendor";

/// Field tagged with the category on every kept record.
pub const CATEGORY_TAG_FIELD: &str = "industry";

/// Field tagged with the location label on every kept record.
pub const LOCATION_TAG_FIELD: &str = "location";

/// Parameters shared by every unit of a run.
#[derive(Debug, Clone)]
pub struct UnitSettings {
    pub tasks_per_item: usize,
    pub retry: RetryConfig,
}

/// Processes one work item.
///
/// Tasks are evaluated one after another. Each task failure is tallied in
/// the run's breakdown. The unit succeeds if any task yields a relevant
/// record, fails with an error if every task errored, and otherwise returns
/// no records.
pub async fn process_item<G, E>(
    generator: &G,
    evaluator: &E,
    ctx: &RunContext,
    settings: &UnitSettings,
    category: &Category,
    item: &WorkItem,
) -> UnitResult
where
    G: WorkGenerator,
    E: UnitEvaluator,
{
    let location = item.label();
    let (tasks, source) =
        generate_with_fallback(generator, &settings.retry, category, &location, settings.tasks_per_item).await;
    debug!(item = %item, tasks = tasks.len(), ?source, "Generated tasks");

    let mut records = Vec::new();
    let mut errored = 0usize;
    let mut last_failure: Option<UnitFailure> = None;

    for task in &tasks {
        match evaluator.evaluate(task, category, &location).await {
            Ok(Some(record)) if is_irrelevant(&record) => {
                trace!(task = %task, "Result is not applicable");
                ctx.record_task_failure(FailureKind::NotApplicable);
            }
            Ok(Some(record)) => {
                records.push(
                    record
                        .with(CATEGORY_TAG_FIELD, category.as_str())
                        .with(LOCATION_TAG_FIELD, location.as_str()),
                );
            }
            Ok(None) => {
                trace!(task = %task, "No result");
                ctx.record_task_failure(FailureKind::InvalidResponse);
            }
            Err(failure) => {
                debug!(task = %task, kind = %failure.kind, error = %failure.message, "Task failed");
                ctx.record_task_failure(failure.kind);
                errored += 1;
                last_failure = Some(failure);
            }
        }
    }

    if records.is_empty()
        && errored == tasks.len()
        && let Some(last) = last_failure
    {
        return Err(UnitFailure::new(
            last.kind,
            format!("all {errored} tasks failed; last: {}", last.message),
        ));
    }
    Ok(records)
}

fn is_irrelevant(record: &ResultRecord) -> bool {
    matches!(record.get(RELEVANCE_FIELD), Some(Value::Bool(false)))
}
