// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Orchestration outcome types.

use serde::Serialize;
use std::fmt;

/// What happened to one scheduled cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellOutcome {
    /// Engine succeeded and the record was persisted
    Succeeded,
    /// Engine or setup failed; a failure record was persisted
    Failed,
    /// Placeholder record persisted without invoking the engine
    DryRun,
    /// A record already existed
    SkippedExisting,
    /// Another worker holds the cell's claim
    SkippedClaimed,
    /// The repository could not be provisioned
    SkippedUnprovisioned,
    /// The record could not be persisted
    PersistFailed,
}

impl CellOutcome {
    /// Whether the engine ran (or a placeholder was fabricated) for this cell.
    pub fn executed(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::DryRun)
    }
}

/// Counts for one orchestration invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Cells selected for this invocation
    pub scheduled: usize,
    /// Successful cells
    pub succeeded: usize,
    /// Failed cells (recorded)
    pub failed: usize,
    /// Dry-run placeholders written
    pub dry_run: usize,
    /// Cells skipped because a record existed
    pub skipped_existing: usize,
    /// Cells skipped because another worker claimed them
    pub skipped_claimed: usize,
    /// Cells skipped because their repository was unavailable
    pub skipped_unprovisioned: usize,
    /// Cells whose record could not be written
    pub persist_errors: usize,
    /// Repositories that could not be provisioned
    pub unprovisioned_repositories: Vec<String>,
}

impl RunSummary {
    /// Count one outcome.
    pub fn record(&mut self, outcome: CellOutcome) {
        let slot = match outcome {
            CellOutcome::Succeeded => &mut self.succeeded,
            CellOutcome::Failed => &mut self.failed,
            CellOutcome::DryRun => &mut self.dry_run,
            CellOutcome::SkippedExisting => &mut self.skipped_existing,
            CellOutcome::SkippedClaimed => &mut self.skipped_claimed,
            CellOutcome::SkippedUnprovisioned => &mut self.skipped_unprovisioned,
            CellOutcome::PersistFailed => &mut self.persist_errors,
        };
        *slot += 1;
    }

    /// Cells that produced a new record.
    pub fn executed(&self) -> usize {
        self.succeeded + self.failed + self.dry_run
    }

    /// Cells accounted for so far.
    pub fn completed(&self) -> usize {
        self.executed()
            + self.skipped_existing
            + self.skipped_claimed
            + self.skipped_unprovisioned
            + self.persist_errors
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} scheduled: {} succeeded, {} failed, {} dry-run, {} already recorded, {} claimed elsewhere, {} unprovisioned, {} not persisted",
            self.scheduled,
            self.succeeded,
            self.failed,
            self.dry_run,
            self.skipped_existing,
            self.skipped_claimed,
            self.skipped_unprovisioned,
            self.persist_errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary {
            scheduled: 5,
            ..Default::default()
        };
        for outcome in [
            CellOutcome::Succeeded,
            CellOutcome::Failed,
            CellOutcome::SkippedExisting,
            CellOutcome::SkippedExisting,
            CellOutcome::PersistFailed,
        ] {
            summary.record(outcome);
        }
        assert_eq!(summary.executed(), 2);
        assert_eq!(summary.completed(), summary.scheduled);
        assert!(summary.to_string().starts_with("5 scheduled: 1 succeeded, 1 failed"));
    }

    #[test]
    fn test_executed_outcomes() {
        assert!(CellOutcome::DryRun.executed());
        assert!(!CellOutcome::SkippedClaimed.executed());
    }
}
