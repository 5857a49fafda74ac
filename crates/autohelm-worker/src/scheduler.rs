use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use autohelm_arbiter::{Decision, ResourceArbiter};
use autohelm_core::config::DUE_WAIT_SLICE_SECS;
use autohelm_core::{
    BackendProbe, Diagnostics, FatalReason, JobId, JobOutcome, JobRole, NotifySink, StopToken,
    WorkerConfig,
};
use autohelm_registry::JobRegistry;
use autohelm_runner::{EmulatorSupervisor, JobRunner, Verdict};

use crate::failure::{backoff_for, FailureRecord, GlobalFailures};

/// Why the loop returned.
#[derive(Debug)]
pub enum ExitReason {
    /// Graceful stop request; process exit code 0.
    Stopped,
    /// Human takeover required; process exit code 1.
    Fatal(FatalReason),
}

/// The main loop: picks the next due job, runs it through arbitration and
/// the runner, and folds every verdict into the failure budgets.
///
/// Jobs run strictly one at a time; the loop owns all mutable scheduling
/// state and every wait it performs is stop-interruptible.
pub struct Scheduler {
    config: WorkerConfig,
    config_path: Option<String>,
    registry: Arc<JobRegistry>,
    runner: JobRunner,
    supervisor: EmulatorSupervisor,
    arbiter: ResourceArbiter,
    probe: Arc<dyn BackendProbe>,
    notifier: Arc<dyn NotifySink>,
    diagnostics: Arc<dyn Diagnostics>,
    stop: StopToken,
    failures: FailureRecord,
    global: GlobalFailures,
    first_pass: bool,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: WorkerConfig,
        config_path: Option<String>,
        registry: Arc<JobRegistry>,
        runner: JobRunner,
        supervisor: EmulatorSupervisor,
        arbiter: ResourceArbiter,
        probe: Arc<dyn BackendProbe>,
        notifier: Arc<dyn NotifySink>,
        diagnostics: Arc<dyn Diagnostics>,
        stop: StopToken,
    ) -> Self {
        Self {
            config,
            config_path,
            registry,
            runner,
            supervisor,
            arbiter,
            probe,
            notifier,
            diagnostics,
            stop,
            failures: FailureRecord::default(),
            global: GlobalFailures::default(),
            first_pass: true,
        }
    }

    pub fn consecutive_failures(&self, job: JobId) -> u32 {
        self.failures.count(job)
    }

    pub fn global_failures(&self) -> u32 {
        self.global.count()
    }

    pub async fn run(&mut self) -> ExitReason {
        info!("scheduler loop started");
        loop {
            if self.stop.is_set() {
                info!("stop requested, shutting down");
                return ExitReason::Stopped;
            }

            // Never dispatch work into a backend outage.
            self.probe.wait_until_available(&mut self.stop).await;
            if self.stop.is_set() {
                return ExitReason::Stopped;
            }
            if self.probe.is_recovered() {
                self.on_backend_recovered();
            }

            if self.supervisor.maintenance_due() {
                if self.supervisor.run_maintenance().await {
                    self.registry.call(JobId::Restart);
                }
                continue;
            }

            let Some(job) = self.registry.next_due_job() else {
                // An operator config can disable everything; that is a
                // dead worker, not a quiet one.
                error!("every job is disabled, nothing can ever run");
                return self.fatal(FatalReason::Contract("every job is disabled".into()));
            };

            let now = Utc::now();
            if !job.is_due(now) {
                let remaining = (job.next_run - now).to_std().unwrap_or_default();
                let slice = remaining.min(Duration::from_secs(DUE_WAIT_SLICE_SECS));
                debug!(job = %job.id, next_run = %job.next_run, "next job not due yet");
                if self.stop.sleep(slice).await {
                    return ExitReason::Stopped;
                }
                continue;
            }

            // On the very first pass the app is in whatever state the
            // operator left it; a relaunch would only lose that state.
            if self.first_pass {
                self.first_pass = false;
                if job.id == JobId::Restart {
                    debug!("skipping the recovery job on the first pass");
                    self.registry.set_enabled(JobId::Restart, false);
                    continue;
                }
            }

            if job.id != JobId::Restart {
                match self.arbiter.checkpoint(job.id).await {
                    Ok(Decision::Stay) => {}
                    Ok(Decision::HandOff { to }) => {
                        debug!(to = %to, "arbiter handed off before dispatch");
                        continue;
                    }
                    Ok(Decision::ResumePrimary) => continue,
                    Ok(Decision::Stall { until }) => {
                        debug!(%until, "no job can progress, stalling");
                        continue;
                    }
                    // Gauge reads are best-effort; a failed checkpoint
                    // must not take the worker down.
                    Err(e) => {
                        warn!(error = %e, "arbiter checkpoint failed, running the scheduled job");
                    }
                }
            }

            info!(job = %job.id, "running job");
            let scheduled_at = self.registry.get(job.id).next_run;
            let verdict = self
                .runner
                .run(job.id, &mut self.supervisor, &mut self.stop)
                .await;

            match verdict {
                Verdict::Success(outcome) => {
                    self.failures.reset(job.id);
                    self.global.reset();
                    self.supervisor.reset();
                    self.on_success(job.id, job.role, outcome, scheduled_at).await;
                }
                Verdict::Recoverable => {
                    // Refresh the availability cache before the next pick.
                    self.probe.check_now().await;
                }
                Verdict::Unrecoverable { propagate } => {
                    if let Some(exit) = self.on_unrecoverable(job.id, propagate).await {
                        return exit;
                    }
                }
                Verdict::Fatal(reason) => return self.fatal(reason),
            }
        }
    }

    async fn on_success(
        &mut self,
        job: JobId,
        role: JobRole,
        outcome: JobOutcome,
        scheduled_at: chrono::DateTime<Utc>,
    ) {
        // The recovery job only runs when fault handling force-schedules
        // it; dormant otherwise.
        if job == JobId::Restart {
            self.registry.set_enabled(JobId::Restart, false);
            return;
        }
        if outcome == JobOutcome::NoWork && role == JobRole::Substitute {
            if let Err(e) = self.arbiter.substitute_idle(job).await {
                warn!(error = %e, "idle hand-off failed, leaving the schedule as is");
            }
            return;
        }
        // Apply the default re-run cool-down unless the body (or the
        // arbiter, underneath us) already moved this job's schedule.
        if self.registry.get(job).next_run == scheduled_at {
            self.registry.delay(
                job,
                chrono::Duration::minutes(self.config.faults.rerun_delay_mins as i64),
            );
        }
    }

    async fn on_unrecoverable(&mut self, job: JobId, propagate: bool) -> Option<ExitReason> {
        let streak = self.failures.bump(job);
        let limit = self.config.failure_threshold_for(job);
        warn!(job = %job, streak, limit, "unrecoverable job failure");
        if streak >= limit {
            return Some(self.fatal(FatalReason::JobFailureLimit { job, count: streak }));
        }

        if propagate {
            let global = self.global.bump();
            if global >= self.config.faults.global_failure_threshold {
                return Some(self.fatal(FatalReason::GlobalFailureLimit { count: global }));
            }
            self.registry.call(JobId::Restart);
            let backoff = backoff_for(global, &self.config.faults);
            warn!(global, ?backoff, "unclassified failure, backing off before retry");
            if self.stop.sleep(backoff).await {
                return Some(ExitReason::Stopped);
            }
        } else {
            // A relaunch puts the app back on a known screen before the
            // job retries.
            self.registry.call(JobId::Restart);
        }
        None
    }

    /// Backend maintenance usually ships changes; pick them up and route
    /// through the recovery job once before resuming the schedule.
    fn on_backend_recovered(&mut self) {
        info!("backend recovered, reloading config");
        match WorkerConfig::load(self.config_path.as_deref()) {
            Ok(config) => self.config = config,
            Err(e) => warn!(error = %e, "config reload failed, keeping the previous config"),
        }
        self.registry.call(JobId::Restart);
    }

    fn fatal(&mut self, reason: FatalReason) -> ExitReason {
        error!(%reason, "fatal condition, requesting human takeover");
        self.notifier
            .notify("human takeover required", &reason.to_string());
        self.diagnostics.capture_and_submit(&reason.to_string());
        ExitReason::Fatal(reason)
    }
}
