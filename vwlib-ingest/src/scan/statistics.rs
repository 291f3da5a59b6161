//! Scan result aggregation

use vwlib_common::events::WorkOutcome;

/// Running tally of per-work outcomes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanCounts {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ScanCounts {
    pub fn record(&mut self, outcome: WorkOutcome) {
        match outcome {
            WorkOutcome::Added => self.added += 1,
            WorkOutcome::Updated => self.updated += 1,
            WorkOutcome::Skipped => self.skipped += 1,
            WorkOutcome::Failed => self.failed += 1,
        }
    }

    /// Works processed so far
    pub fn total(&self) -> usize {
        self.added + self.updated + self.skipped + self.failed
    }

    /// Human-readable run summary
    pub fn summary(&self) -> String {
        format!(
            "{} added, {} updated, {} skipped, {} failed ({} works)",
            self.added,
            self.updated,
            self.skipped,
            self.failed,
            self.total()
        )
    }
}
