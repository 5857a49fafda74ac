use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use autohelm_core::config::WorkerConfig;
use autohelm_core::types::{Job, JobId};

struct Slot {
    enabled: bool,
    next_run: DateTime<Utc>,
}

/// A batched registry mutation, applied atomically by
/// [`JobRegistry::multi_set`].
#[derive(Default)]
pub struct Batch {
    ops: Vec<Op>,
}

enum Op {
    SetEnabled(JobId, bool),
    SetNextRun(JobId, DateTime<Utc>),
    Call(JobId),
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled(mut self, id: JobId, enabled: bool) -> Self {
        self.ops.push(Op::SetEnabled(id, enabled));
        self
    }

    pub fn set_next_run(mut self, id: JobId, at: DateTime<Utc>) -> Self {
        self.ops.push(Op::SetNextRun(id, at));
        self
    }

    /// Enable `id` and make it due immediately.
    pub fn call(mut self, id: JobId) -> Self {
        self.ops.push(Op::Call(id));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The in-memory job table. One slot per [`JobId`], created at startup,
/// never persisted.
pub struct JobRegistry {
    inner: RwLock<HashMap<JobId, Slot>>,
}

impl JobRegistry {
    /// Build the table from config: every job exists, jobs listed under
    /// `[jobs] disabled` start disabled, everything is due immediately.
    pub fn from_config(config: &WorkerConfig) -> Self {
        let now = Utc::now();
        let inner = JobId::ALL
            .into_iter()
            .map(|id| {
                let enabled = !config.jobs.disabled.contains(&id);
                (
                    id,
                    Slot {
                        enabled,
                        next_run: now,
                    },
                )
            })
            .collect();
        Self {
            inner: RwLock::new(inner),
        }
    }

    pub fn get(&self, id: JobId) -> Job {
        let inner = self.inner.read().unwrap();
        let slot = &inner[&id];
        Job {
            id,
            enabled: slot.enabled,
            next_run: slot.next_run,
            role: id.role(),
        }
    }

    pub fn snapshot(&self) -> Vec<Job> {
        let inner = self.inner.read().unwrap();
        JobId::ALL
            .into_iter()
            .map(|id| {
                let slot = &inner[&id];
                Job {
                    id,
                    enabled: slot.enabled,
                    next_run: slot.next_run,
                    role: id.role(),
                }
            })
            .collect()
    }

    pub fn is_enabled(&self, id: JobId) -> bool {
        self.inner.read().unwrap()[&id].enabled
    }

    /// The job to dispatch next. Among currently due jobs the fixed
    /// priority order decides (recovery first), regardless of how long
    /// each has been due; `next_run` age must not outrank a
    /// force-scheduled job. With nothing due, the soonest upcoming job is
    /// returned so the caller knows how long to wait. `None` when every
    /// job is disabled.
    pub fn next_due_job(&self) -> Option<Job> {
        let now = Utc::now();
        let enabled: Vec<Job> = self
            .snapshot()
            .into_iter()
            .filter(|job| job.enabled)
            .collect();
        enabled
            .iter()
            .filter(|job| job.is_due(now))
            .min_by_key(|job| job.id.priority())
            .or_else(|| enabled.iter().min_by_key(|job| (job.next_run, job.id.priority())))
            .cloned()
    }

    /// Soonest `next_run` across all enabled jobs — the cooldown registry
    /// consulted so arbiter re-checks never fire earlier than an
    /// externally imposed cooldown.
    pub fn soonest_next_run(&self) -> Option<DateTime<Utc>> {
        self.snapshot()
            .into_iter()
            .filter(|job| job.enabled)
            .map(|job| job.next_run)
            .min()
    }

    pub fn set_enabled(&self, id: JobId, enabled: bool) {
        let mut inner = self.inner.write().unwrap();
        if let Some(slot) = inner.get_mut(&id) {
            slot.enabled = enabled;
        }
    }

    pub fn set_next_run(&self, id: JobId, at: DateTime<Utc>) {
        let mut inner = self.inner.write().unwrap();
        if let Some(slot) = inner.get_mut(&id) {
            slot.next_run = at;
        }
    }

    /// Force-schedule `id` now (enable + next_run = now).
    pub fn call(&self, id: JobId) {
        debug!(job = %id, "force-scheduling job");
        let mut inner = self.inner.write().unwrap();
        if let Some(slot) = inner.get_mut(&id) {
            slot.enabled = true;
            slot.next_run = Utc::now();
        }
    }

    /// Push `id`'s next run `delay` into the future.
    pub fn delay(&self, id: JobId, delay: Duration) {
        self.set_next_run(id, Utc::now() + delay);
    }

    /// Apply a whole batch under one write guard. Concurrent readers see
    /// either none or all of it.
    pub fn multi_set(&self, batch: Batch) {
        let now = Utc::now();
        let mut inner = self.inner.write().unwrap();
        for op in batch.ops {
            match op {
                Op::SetEnabled(id, enabled) => {
                    if let Some(slot) = inner.get_mut(&id) {
                        slot.enabled = enabled;
                    }
                }
                Op::SetNextRun(id, at) => {
                    if let Some(slot) = inner.get_mut(&id) {
                        slot.next_run = at;
                    }
                }
                Op::Call(id) => {
                    if let Some(slot) = inner.get_mut(&id) {
                        slot.enabled = true;
                        slot.next_run = now;
                    }
                }
            }
        }
    }
}
