use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use autohelm_core::config::{EmulatorSection, EMULATOR_SETTLE_SECS};
use autohelm_core::EmulatorControl;

/// Decision for one occurrence of the stuck fault class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckAction {
    /// Emulator restarted; relaunch the app and carry on.
    Restarted,
    /// Restart attempt failed; logged, not double-counted. Carry on.
    RestartFailed,
    /// Restarts disabled by config; caller applies the fixed cool-down.
    CoolDown,
    /// Counter reached the threshold; repeated restarts did not help, the
    /// condition is not self-healing.
    Escalate { count: u32 },
}

/// Decision for one occurrence of the offline fault class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineAction {
    Restarted,
    /// Restart budget spent.
    Exhausted { limit: u32 },
    /// Restart failed or disabled; this class never retries blindly.
    Unavailable,
}

/// Environment self-healing state: two independent fault-class counters
/// plus the periodic maintenance restart baseline.
///
/// Restart actions are idempotent and safe to over-trigger for the stuck
/// class, but strictly threshold-gated for the offline class to avoid an
/// infinite restart loop against a dead host.
pub struct EmulatorSupervisor {
    control: Arc<dyn EmulatorControl>,
    config: EmulatorSection,
    stuck_count: u32,
    offline_count: u32,
    last_restart: Instant,
}

impl EmulatorSupervisor {
    pub fn new(control: Arc<dyn EmulatorControl>, config: EmulatorSection) -> Self {
        Self {
            control,
            config,
            stuck_count: 0,
            offline_count: 0,
            last_restart: Instant::now(),
        }
    }

    /// Any job success means the environment is healthy again.
    pub fn reset(&mut self) {
        self.stuck_count = 0;
        self.offline_count = 0;
    }

    pub fn stuck_count(&self) -> u32 {
        self.stuck_count
    }

    pub fn offline_count(&self) -> u32 {
        self.offline_count
    }

    /// Record one stuck occurrence and decide what to do about it.
    ///
    /// Below the threshold every occurrence gets its own restart attempt;
    /// at the threshold no further attempt is made and the fault surfaces
    /// as fatal.
    pub async fn on_stuck(&mut self) -> StuckAction {
        self.stuck_count += 1;
        let limit = self.config.stuck_threshold;
        warn!(count = self.stuck_count, limit, "app stuck");

        if self.stuck_count >= limit {
            error!(count = self.stuck_count, "app kept getting stuck, giving up on restarts");
            return StuckAction::Escalate {
                count: self.stuck_count,
            };
        }
        if !self.config.stuck_restart {
            return StuckAction::CoolDown;
        }
        if self.restart_emulator().await {
            StuckAction::Restarted
        } else {
            StuckAction::RestartFailed
        }
    }

    /// Record one offline occurrence and decide what to do about it.
    pub async fn on_offline(&mut self) -> OfflineAction {
        self.offline_count += 1;
        let limit = self.config.offline_threshold;
        warn!(count = self.offline_count, limit, "emulator offline");

        if !self.config.offline_restart {
            warn!("emulator auto-restart is disabled");
            return OfflineAction::Unavailable;
        }
        if self.offline_count > limit {
            error!(limit, "emulator restart limit reached");
            return OfflineAction::Exhausted { limit };
        }
        if self.restart_emulator().await {
            OfflineAction::Restarted
        } else {
            OfflineAction::Unavailable
        }
    }

    /// Whether the periodic maintenance restart is due. Checked only
    /// between jobs, never during one.
    pub fn maintenance_due(&self) -> bool {
        if !self.config.scheduled_restart {
            return false;
        }
        let interval = Duration::from_secs(self.config.restart_interval_hours * 3600);
        self.last_restart.elapsed() >= interval
    }

    /// Perform the maintenance restart. Success resets the elapsed-time
    /// baseline; failure leaves it untouched so the restart is retried on
    /// the next iteration.
    pub async fn run_maintenance(&mut self) -> bool {
        info!(
            interval_hours = self.config.restart_interval_hours,
            "scheduled emulator restart"
        );
        if self.restart_emulator().await {
            self.last_restart = Instant::now();
            true
        } else {
            warn!("scheduled emulator restart failed, continuing normally");
            false
        }
    }

    /// Stop, settle, start. Lifecycle failures are logged; the overall
    /// result is the boolean the fault handlers act on.
    async fn restart_emulator(&mut self) -> bool {
        info!("stopping emulator");
        if let Err(e) = self.control.stop().await {
            error!(error = %e, "emulator stop failed");
            return false;
        }
        tokio::time::sleep(Duration::from_secs(EMULATOR_SETTLE_SECS)).await;
        info!("starting emulator");
        if let Err(e) = self.control.start().await {
            error!(error = %e, "emulator start failed");
            return false;
        }
        info!("emulator restart complete");
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct FakeControl {
        restarts: AtomicU32,
        fail_stop: bool,
    }

    #[async_trait]
    impl EmulatorControl for FakeControl {
        async fn stop(&self) -> anyhow::Result<()> {
            if self.fail_stop {
                anyhow::bail!("stop refused");
            }
            Ok(())
        }

        async fn start(&self) -> anyhow::Result<()> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn supervisor(control: Arc<FakeControl>, config: EmulatorSection) -> EmulatorSupervisor {
        EmulatorSupervisor::new(control, config)
    }

    /// One restart attempt per occurrence below the threshold, escalation
    /// instead of a third attempt on the third occurrence.
    #[tokio::test(start_paused = true)]
    async fn stuck_escalates_at_threshold_without_another_restart() {
        let control = Arc::new(FakeControl::default());
        let mut sup = supervisor(Arc::clone(&control), EmulatorSection::default());

        assert_eq!(sup.on_stuck().await, StuckAction::Restarted);
        assert_eq!(sup.stuck_count(), 1);
        assert_eq!(sup.on_stuck().await, StuckAction::Restarted);
        assert_eq!(sup.on_stuck().await, StuckAction::Escalate { count: 3 });
        assert_eq!(control.restarts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_restart_failure_is_not_double_counted() {
        let control = Arc::new(FakeControl {
            fail_stop: true,
            ..FakeControl::default()
        });
        let mut sup = supervisor(control, EmulatorSection::default());
        assert_eq!(sup.on_stuck().await, StuckAction::RestartFailed);
        assert_eq!(sup.stuck_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_without_restart_enabled_cools_down() {
        let control = Arc::new(FakeControl::default());
        let config = EmulatorSection {
            stuck_restart: false,
            ..EmulatorSection::default()
        };
        let mut sup = supervisor(control, config);
        assert_eq!(sup.on_stuck().await, StuckAction::CoolDown);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_is_threshold_gated() {
        let control = Arc::new(FakeControl::default());
        let mut sup = supervisor(Arc::clone(&control), EmulatorSection::default());
        for _ in 0..3 {
            assert_eq!(sup.on_offline().await, OfflineAction::Restarted);
        }
        assert_eq!(sup.on_offline().await, OfflineAction::Exhausted { limit: 3 });
        assert_eq!(control.restarts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_with_restart_disabled_is_unavailable() {
        let control = Arc::new(FakeControl::default());
        let config = EmulatorSection {
            offline_restart: false,
            ..EmulatorSection::default()
        };
        let mut sup = supervisor(control, config);
        assert_eq!(sup.on_offline().await, OfflineAction::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_both_counters() {
        let control = Arc::new(FakeControl::default());
        let mut sup = supervisor(control, EmulatorSection::default());
        sup.on_stuck().await;
        sup.on_offline().await;
        sup.reset();
        assert_eq!(sup.stuck_count(), 0);
        assert_eq!(sup.offline_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn maintenance_baseline_moves_only_on_success() {
        let control = Arc::new(FakeControl::default());
        let config = EmulatorSection {
            scheduled_restart: true,
            restart_interval_hours: 1,
            ..EmulatorSection::default()
        };
        let mut sup = supervisor(control, config);
        assert!(!sup.maintenance_due());
        tokio::time::advance(Duration::from_secs(3601)).await;
        assert!(sup.maintenance_due());
        assert!(sup.run_maintenance().await);
        assert!(!sup.maintenance_due());
    }
}
