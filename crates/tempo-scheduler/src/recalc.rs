//! Bulk next-run recalculation.
//!
//! Thin orchestration over the evaluator: walk every enabled DAILY/WEEKLY
//! job, recompute its next fire, and write the result back. One broken job
//! never aborts the batch — per-job failures are tallied and logged. ONCE
//! jobs are never touched: a fired-and-passed one-time rule is not
//! "recalculated" into the future.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::recurrence::compute_next_run;
use crate::store::JobStore;

/// Outcome tally of one recalculation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecalcReport {
    /// Jobs whose `next_run_at` was written.
    pub updated: usize,
    /// Jobs whose rule yielded no future occurrence; their `next_run_at`
    /// is left unchanged, never nulled.
    pub failed: usize,
    /// Jobs skipped because a concurrent edit bumped the rule version
    /// between read and write-back.
    pub stale: usize,
}

/// Re-evaluates `next_run_at` for all enabled recurring jobs.
pub struct BulkRecalculator<'a> {
    store: &'a JobStore,
}

impl<'a> BulkRecalculator<'a> {
    pub fn new(store: &'a JobStore) -> Self {
        Self { store }
    }

    /// One pass over the working set. Idempotent: with no intervening edits
    /// and the same `now`, repeating the pass yields the same `next_run_at`
    /// for every job; an advancing `now` can only move results forward.
    pub fn recalculate_all(&self, now: DateTime<Utc>) -> crate::error::Result<RecalcReport> {
        let jobs = self.store.list_enabled_recurring()?;
        let mut report = RecalcReport::default();

        for job in jobs {
            let now_local = now.with_timezone(&job.rule.timezone);
            match compute_next_run(&job.rule, now_local) {
                Some(next) => {
                    let civil = self.store.to_store_civil(next);
                    if self
                        .store
                        .write_next_run(&job.id, Some(&civil), job.rule_version, now)?
                    {
                        report.updated += 1;
                    } else {
                        // The edit's own recompute stands; ours is stale.
                        report.stale += 1;
                    }
                }
                None => {
                    warn!(job_id = %job.id, name = %job.name,
                        "recalculation yielded no occurrence; next_run_at left unchanged");
                    report.failed += 1;
                }
            }
        }

        info!(
            updated = report.updated,
            failed = report.failed,
            stale = report.stale,
            "bulk recalculation finished"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
