//! End-of-run reporting.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::dispatch::{BatchReport, FailureBreakdown, FailureKind};
use crate::persistence::ProgressCounters;
use crate::types::Category;

/// What happened to one category during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category: Category,
    pub batches: usize,
    pub units: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: usize,
    pub new_records: usize,
    /// Handles returned by the exporter.
    pub exports: Vec<String>,
    pub total: usize,
    pub remaining: usize,
    /// True if the catalog scope was exhausted.
    pub complete: bool,
}

impl CategorySummary {
    pub fn new(category: Category, total: usize) -> Self {
        CategorySummary {
            category,
            batches: 0,
            units: 0,
            succeeded: 0,
            failed: 0,
            errors: 0,
            new_records: 0,
            exports: Vec::new(),
            total,
            remaining: total,
            complete: false,
        }
    }

    pub(crate) fn absorb(&mut self, report: &BatchReport) {
        self.units += report.units();
        self.succeeded += report.succeeded;
        self.failed += report.failed;
        self.errors += report.errors.len();
    }
}

/// Summary of a whole run, emitted even when the run was cancelled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub categories: Vec<CategorySummary>,
    /// Cumulative counters, including earlier runs.
    pub progress: ProgressCounters,
    pub breakdown: FailureBreakdown,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn new_records(&self) -> usize {
        self.categories.iter().map(|c| c.new_records).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = if self.cancelled { "cancelled" } else { "finished" };
        writeln!(f, "Run {outcome}")?;

        for c in &self.categories {
            let state = if c.complete { "complete" } else { "incomplete" };
            writeln!(
                f,
                "  {}: {} units ({} succeeded, {} failed, {} errors), {} new records, {}/{} remaining ({state})",
                c.category, c.units, c.succeeded, c.failed, c.errors, c.new_records, c.remaining, c.total
            )?;
            for handle in &c.exports {
                writeln!(f, "    exported {handle}")?;
            }
        }

        writeln!(
            f,
            "Totals: processed={} successful={} failed={}",
            self.progress.total_processed, self.progress.successful, self.progress.failed
        )?;
        write_breakdown(f, "Unit failures", &self.breakdown.units)?;
        write_breakdown(f, "Task failures", &self.breakdown.tasks)
    }
}

fn write_breakdown(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    counts: &BTreeMap<FailureKind, u64>,
) -> fmt::Result {
    if counts.is_empty() {
        return writeln!(f, "{label}: none");
    }
    let parts: Vec<String> = counts.iter().map(|(kind, n)| format!("{kind}={n}")).collect();
    writeln!(f, "{label}: {}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_categories_and_breakdown() {
        let mut category = CategorySummary::new(Category::parse("optometry").unwrap(), 10);
        category.units = 4;
        category.succeeded = 3;
        category.failed = 1;
        category.remaining = 6;
        category.new_records = 7;

        let mut breakdown = FailureBreakdown::default();
        breakdown.record_unit(FailureKind::Timeout);

        let summary = RunSummary {
            categories: vec![category],
            progress: ProgressCounters::new(),
            breakdown,
            cancelled: true,
        };
        let text = summary.to_string();

        assert!(text.starts_with("Run cancelled"));
        assert!(text.contains("optometry: 4 units (3 succeeded, 1 failed, 0 errors), 7 new records, 6/10 remaining"));
        assert!(text.contains("Unit failures: timeout=1"));
        assert!(text.contains("Task failures: none"));
    }
}
