use async_trait::async_trait;
use tracing::info;

/// Progress is surfaced every this many users, and on the last one
pub const REPORT_EVERY: usize = 5;

/// Running totals of a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub processed: usize,
    pub total: usize,
    pub joined: usize,
    pub already_in: usize,
    pub failed: usize,
}

/// Final tally of a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationOutcome {
    pub total: usize,
    pub joined: usize,
    pub already_in: usize,
    pub failed: usize,
    /// Members that were already present but could not be given the role.
    /// These are also counted in `already_in`.
    pub role_failures: usize,
}

impl ReconciliationOutcome {
    pub fn snapshot(&self, processed: usize) -> ProgressSnapshot {
        ProgressSnapshot {
            processed,
            total: self.total,
            joined: self.joined,
            already_in: self.already_in,
            failed: self.failed,
        }
    }
}

/// Whether a snapshot should be emitted after `processed` of `total` users
pub fn should_report(processed: usize, total: usize) -> bool {
    processed > 0 && (processed % REPORT_EVERY == 0 || processed == total)
}

/// Operator-facing sink for backup progress.
///
/// `progress` is called a bounded number of times per run; `finish` is always
/// called exactly once, last.
#[async_trait]
pub trait ProgressReporter: Send {
    async fn progress(&mut self, snapshot: ProgressSnapshot);

    async fn finish(&mut self, outcome: &ReconciliationOutcome);
}

/// Reporter that only writes to the log
#[derive(Debug, Default)]
pub struct LogReporter {
    pub guild_id: String,
}

#[async_trait]
impl ProgressReporter for LogReporter {
    async fn progress(&mut self, snapshot: ProgressSnapshot) {
        info!(
            "Backup {}: {}/{} processed (joined {}, already in {}, failed {})",
            self.guild_id,
            snapshot.processed,
            snapshot.total,
            snapshot.joined,
            snapshot.already_in,
            snapshot.failed
        );
    }

    async fn finish(&mut self, outcome: &ReconciliationOutcome) {
        info!(
            "Backup {} complete: {} total, {} joined, {} already in, {} failed",
            self.guild_id, outcome.total, outcome.joined, outcome.already_in, outcome.failed
        );
    }
}
