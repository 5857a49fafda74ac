use std::collections::HashMap;
use std::time::Duration;

use autohelm_core::config::FaultsSection;
use autohelm_core::JobId;

/// Consecutive unrecoverable-failure counters, one per job.
///
/// Any success of a job clears its own streak; recoverable faults touch
/// nothing. In-memory only, so a process restart starts everyone with a
/// clean slate.
#[derive(Debug, Default)]
pub struct FailureRecord {
    counts: HashMap<JobId, u32>,
}

impl FailureRecord {
    pub fn bump(&mut self, job: JobId) -> u32 {
        let count = self.counts.entry(job).or_insert(0);
        *count += 1;
        *count
    }

    pub fn reset(&mut self, job: JobId) {
        self.counts.remove(&job);
    }

    pub fn count(&self, job: JobId) -> u32 {
        self.counts.get(&job).copied().unwrap_or(0)
    }
}

/// Consecutive unclassified scheduler-level failures.
#[derive(Debug, Default)]
pub struct GlobalFailures {
    count: u32,
}

impl GlobalFailures {
    pub fn bump(&mut self) -> u32 {
        self.count += 1;
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Backoff after an unclassified failure: short while the streak is young,
/// long once it persists, to ride out network instability instead of
/// hammering a struggling environment.
pub fn backoff_for(streak: u32, faults: &FaultsSection) -> Duration {
    if streak < 4 {
        Duration::from_secs(faults.retry_backoff_secs)
    } else {
        Duration::from_secs(faults.long_backoff_secs)
    }
}
