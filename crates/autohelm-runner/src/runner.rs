use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use autohelm_core::config::FAULT_COOLDOWN_SECS;
use autohelm_core::{
    BackendProbe, Diagnostics, FatalReason, JobBody, JobFault, JobId, JobOutcome, NotifySink,
    StopToken,
};
use autohelm_registry::JobRegistry;

use crate::supervisor::{EmulatorSupervisor, OfflineAction, StuckAction};

/// What one job invocation means for the scheduler loop.
///
/// The unclassified case carries `propagate: true` so the per-job and the
/// global failure budgets advance simultaneously — unknown failures are
/// doubly suspicious, and the contract is visible at the type level
/// instead of hiding in re-raise semantics.
#[derive(Debug)]
pub enum Verdict {
    Success(JobOutcome),
    /// Believed self-healing; never counts against the job.
    Recoverable,
    Unrecoverable { propagate: bool },
    Fatal(FatalReason),
}

/// Runs one job invocation and classifies its result.
pub struct JobRunner {
    body: Arc<dyn JobBody>,
    registry: Arc<JobRegistry>,
    probe: Arc<dyn BackendProbe>,
    notifier: Arc<dyn NotifySink>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl JobRunner {
    pub fn new(
        body: Arc<dyn JobBody>,
        registry: Arc<JobRegistry>,
        probe: Arc<dyn BackendProbe>,
        notifier: Arc<dyn NotifySink>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            body,
            registry,
            probe,
            notifier,
            diagnostics,
        }
    }

    /// Invoke `job` and translate whatever happens into a [`Verdict`].
    pub async fn run(
        &self,
        job: JobId,
        supervisor: &mut EmulatorSupervisor,
        stop: &mut StopToken,
    ) -> Verdict {
        let fault = match self.body.invoke(job).await {
            Ok(outcome) => return Verdict::Success(outcome),
            Err(fault) => fault,
        };

        match fault {
            JobFault::AppNotRunning => {
                warn!(job = %job, "app is not running, scheduling recovery");
                self.notifier
                    .notify("app not running", &format!("job `{job}`: relaunching the app"));
                self.registry.call(JobId::Restart);
                Verdict::Recoverable
            }

            JobFault::AppStuck(detail) => {
                error!(job = %job, detail = %detail, "app stuck");
                self.diagnostics
                    .capture_and_submit(&format!("job `{job}` stuck: {detail}"));
                match supervisor.on_stuck().await {
                    StuckAction::Escalate { count } => Verdict::Fatal(FatalReason::StuckLimit { count }),
                    StuckAction::Restarted | StuckAction::RestartFailed => {
                        self.registry.call(JobId::Restart);
                        Verdict::Recoverable
                    }
                    StuckAction::CoolDown => {
                        self.notifier
                            .notify("app stuck", &format!("job `{job}`: relaunching the app"));
                        self.registry.call(JobId::Restart);
                        stop.sleep(Duration::from_secs(FAULT_COOLDOWN_SECS)).await;
                        Verdict::Recoverable
                    }
                }
            }

            JobFault::AppGlitch(detail) => {
                warn!(job = %job, detail = %detail, "app glitch, relaunching to clear it");
                self.diagnostics
                    .capture_and_submit(&format!("job `{job}` glitch: {detail}"));
                self.notifier
                    .notify("app glitch", &format!("job `{job}`: relaunching the app"));
                self.registry.call(JobId::Restart);
                stop.sleep(Duration::from_secs(FAULT_COOLDOWN_SECS)).await;
                Verdict::Recoverable
            }

            JobFault::BackendSuspect => {
                info!(job = %job, "unrecognised state, probing backend");
                if self.probe.check_now().await {
                    // The backend is fine yet the job is lost: a real
                    // defect, not an outage.
                    error!(job = %job, "backend reachable, treating unrecognised state as a defect");
                    self.diagnostics
                        .capture_and_submit(&format!("job `{job}` lost with backend reachable"));
                    Verdict::Fatal(FatalReason::BackendHealthyDefect { job })
                } else {
                    self.probe.wait_until_available(stop).await;
                    Verdict::Recoverable
                }
            }

            JobFault::EmulatorOffline => {
                error!(job = %job, "emulator offline during job");
                self.diagnostics
                    .capture_and_submit(&format!("job `{job}`: emulator offline"));
                match supervisor.on_offline().await {
                    OfflineAction::Restarted => {
                        self.notifier
                            .notify("emulator offline", "emulator was restarted automatically");
                        self.registry.call(JobId::Restart);
                        Verdict::Recoverable
                    }
                    OfflineAction::Exhausted { limit } => {
                        Verdict::Fatal(FatalReason::RestartExhausted { limit })
                    }
                    OfflineAction::Unavailable => Verdict::Fatal(FatalReason::RestartUnavailable),
                }
            }

            JobFault::Contract(msg) => {
                error!(job = %job, %msg, "contract violation, retrying cannot fix this");
                Verdict::Fatal(FatalReason::Contract(msg))
            }

            JobFault::Failed { kind, detail } => {
                error!(job = %job, %kind, %detail, "job failed");
                self.diagnostics
                    .capture_and_submit(&format!("job `{job}` failed ({kind}): {detail}"));
                Verdict::Unrecoverable { propagate: false }
            }

            JobFault::Unexpected(e) => {
                error!(job = %job, error = ?e, "unclassified failure");
                self.diagnostics
                    .capture_and_submit(&format!("job `{job}` unclassified failure: {e:#}"));
                self.notifier
                    .notify("unclassified failure", &format!("job `{job}`: {e:#}"));
                Verdict::Unrecoverable { propagate: true }
            }
        }
    }
}
