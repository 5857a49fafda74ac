use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use autohelm_core::config::ArbiterSection;
use autohelm_core::{Gauge, JobId, JobRole, NotifySink, ResourceReader};
use autohelm_registry::{Batch, JobRegistry};

/// What the scheduler should do after a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep running the current job.
    Stay,
    /// Control moved to a substitute; the registry is already updated.
    HandOff { to: JobId },
    /// Control moved back to the primary; the registry is already updated.
    ResumePrimary,
    /// No job can usefully progress right now; re-check at `until`.
    Stall { until: DateTime<Utc> },
}

/// Arbitrates between the primary job and the currency-regenerating
/// substitutes.
///
/// Gauge levels are read fresh at every checkpoint, never cached. All
/// multi-job registry changes go through one atomic batch. Starvation is
/// absorbed with a bounded delay and a single notification per onset; it
/// never escalates to a fatal condition on its own.
pub struct ResourceArbiter {
    registry: Arc<JobRegistry>,
    reader: Arc<dyn ResourceReader>,
    notifier: Arc<dyn NotifySink>,
    config: ArbiterSection,
    primary: JobId,
    /// Latch for the starvation notice, held until the condition clears.
    starving: bool,
    /// Latch for the primary low-stamina notice.
    stamina_notified: bool,
    /// Latch for the hand-off notice; re-arms once currency clears the
    /// reserve again, so intra-episode re-switches stay quiet.
    handoff_notified: bool,
    /// Substitutes that reported no-work in the current fallback scan.
    /// Cleared on every hand-off cycle and on hand-back, so an idle
    /// substitute stays eligible next cycle.
    idle_scan: Vec<JobId>,
}

impl ResourceArbiter {
    pub fn new(
        registry: Arc<JobRegistry>,
        reader: Arc<dyn ResourceReader>,
        notifier: Arc<dyn NotifySink>,
        config: ArbiterSection,
    ) -> Self {
        Self {
            registry,
            reader,
            notifier,
            config,
            primary: JobId::Leveling,
            starving: false,
            stamina_notified: false,
            handoff_notified: false,
            idle_scan: Vec::new(),
        }
    }

    /// Participating substitutes in their fixed priority order. The
    /// canonical order is shared between the enable batch and the
    /// try-next scan; the config list only selects membership.
    fn substitutes(&self) -> Vec<JobId> {
        JobId::SUBSTITUTES
            .into_iter()
            .filter(|s| self.config.substitutes.contains(s))
            .collect()
    }

    /// Never fire a re-check earlier than an externally imposed cooldown.
    fn reconcile(&self, candidate: DateTime<Utc>) -> DateTime<Utc> {
        match self.registry.soonest_next_run() {
            Some(soonest) if soonest > candidate => soonest,
            _ => candidate,
        }
    }

    fn stall_cooldown(&self) -> Duration {
        Duration::minutes(self.config.stall_cooldown_mins)
    }

    /// Decide whether control should move, given the currently active job.
    pub async fn checkpoint(&mut self, active: JobId) -> anyhow::Result<Decision> {
        let currency = self.reader.read(Gauge::Currency).await?;
        let stamina = self.reader.read(Gauge::Stamina).await?;
        let on_substitute = active.role() == JobRole::Substitute;
        debug!(job = %active, currency, stamina, "arbiter checkpoint");

        // A zero margin disables currency-based gating entirely, leaving
        // only stamina-based admission control active.
        let gating = self.config.currency_return_margin > 0;

        if gating && currency < self.config.currency_reserve {
            // An admissible substitute that is already running keeps
            // running; switching is for getting regeneration started or
            // away from a substitute that ran out of stamina.
            if on_substitute && stamina >= self.config.stamina_reserve_for(active) {
                return Ok(Decision::Stay);
            }
            return Ok(self.switch_to_substitutes(active, currency, stamina));
        }

        self.starving = false;
        self.handoff_notified = false;
        if on_substitute {
            if !gating || currency >= self.config.currency_return_threshold() {
                info!(currency, "currency replenished, resuming primary");
                return Ok(self.hand_back());
            }
            // Inside the hysteresis band: keep regenerating.
            return Ok(Decision::Stay);
        }

        if active == self.primary && stamina < self.config.primary_stamina_reserve {
            warn!(
                stamina,
                reserve = self.config.primary_stamina_reserve,
                "stamina below primary reserve, delaying"
            );
            if !self.stamina_notified {
                self.stamina_notified = true;
                self.notifier.notify(
                    "stamina low",
                    &format!(
                        "stamina {stamina} below the primary reserve {}, delaying",
                        self.config.primary_stamina_reserve
                    ),
                );
            }
            let until = self.reconcile(Utc::now() + self.stall_cooldown());
            self.registry.set_next_run(self.primary, until);
            return Ok(Decision::Stall { until });
        }

        self.stamina_notified = false;
        Ok(Decision::Stay)
    }

    /// A running substitute found nothing left to do: advance to the next
    /// one in fixed order (wrapping, skipping itself and anything already
    /// idle this scan); when the whole set is exhausted, hand back to the
    /// primary regardless of currency — never starve waiting on currency
    /// that cannot be produced.
    pub async fn substitute_idle(&mut self, job: JobId) -> anyhow::Result<Decision> {
        if !self.idle_scan.contains(&job) {
            self.idle_scan.push(job);
        }
        let order = self.substitutes();
        let stamina = self.reader.read(Gauge::Stamina).await?;

        let start = order.iter().position(|s| *s == job).map_or(0, |i| i + 1);
        let rotated = order[start..].iter().chain(order[..start].iter());
        for &candidate in rotated {
            if candidate == job || self.idle_scan.contains(&candidate) {
                continue;
            }
            if stamina < self.config.stamina_reserve_for(candidate) {
                debug!(job = %candidate, stamina, "substitute skipped, stamina below its reserve");
                continue;
            }
            info!(from = %job, to = %candidate, "substitute idle, trying next");
            self.registry
                .multi_set(Batch::new().set_enabled(job, false).call(candidate));
            return Ok(Decision::HandOff { to: candidate });
        }

        warn!("no substitute has work left, resuming primary");
        Ok(self.hand_back())
    }

    fn switch_to_substitutes(&mut self, active: JobId, currency: i64, stamina: i64) -> Decision {
        let order = self.substitutes();
        let admitted: Vec<JobId> = order
            .iter()
            .copied()
            .filter(|s| stamina >= self.config.stamina_reserve_for(*s))
            .collect();

        // Zero available substitutes is the no-progress branch, not an
        // error.
        if admitted.is_empty() {
            warn!(currency, stamina, "currency below reserve and no substitute admissible");
            if !self.starving {
                self.starving = true;
                self.notifier.notify(
                    "no job can progress",
                    &format!(
                        "currency {currency} below reserve {} and stamina {stamina} \
                         below every substitute's minimum",
                        self.config.currency_reserve
                    ),
                );
            }
            let until = self.reconcile(Utc::now() + self.stall_cooldown());
            self.registry.set_next_run(self.primary, until);
            return Decision::Stall { until };
        }

        self.starving = false;
        self.idle_scan.clear();

        // Skip whichever substitute just handed off; with the primary
        // active nothing is skipped.
        let target = admitted
            .iter()
            .copied()
            .find(|s| *s != active)
            .unwrap_or(admitted[0]);

        // Substitutes below their stamina floor are parked in the same
        // batch, so the dispatcher cannot re-pick one and bounce straight
        // back here.
        let until = self.reconcile(Utc::now() + self.stall_cooldown());
        let mut batch = Batch::new();
        for s in &order {
            batch = batch.set_enabled(*s, admitted.contains(s));
        }
        batch = batch.call(target).set_next_run(self.primary, until);
        self.registry.multi_set(batch);

        info!(currency, reserve = self.config.currency_reserve, to = %target, "handing off to substitutes");
        if !self.handoff_notified {
            self.handoff_notified = true;
            self.notifier.notify(
                "switching to substitutes",
                &format!(
                    "currency {currency} below reserve {}; running `{target}` to regenerate",
                    self.config.currency_reserve
                ),
            );
        }
        Decision::HandOff { to: target }
    }

    /// Disable the whole substitute set and give control back to the
    /// primary, in one atomic batch.
    fn hand_back(&mut self) -> Decision {
        let mut batch = Batch::new();
        for s in self.substitutes() {
            batch = batch.set_enabled(s, false);
        }
        batch = batch.call(self.primary);
        self.registry.multi_set(batch);
        self.idle_scan.clear();
        self.starving = false;
        self.handoff_notified = false;
        self.notifier
            .notify("resuming primary", &format!("substitutes disabled, `{}` resumed", self.primary));
        Decision::ResumePrimary
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use autohelm_core::config::WorkerConfig;

    use super::*;

    struct FakeReader {
        gauges: Mutex<HashMap<&'static str, i64>>,
    }

    impl FakeReader {
        fn new(currency: i64, stamina: i64) -> Arc<Self> {
            Arc::new(Self {
                gauges: Mutex::new(HashMap::from([
                    ("currency", currency),
                    ("stamina", stamina),
                ])),
            })
        }

        fn set(&self, gauge: Gauge, value: i64) {
            self.gauges.lock().unwrap().insert(gauge.as_str(), value);
        }
    }

    #[async_trait]
    impl ResourceReader for FakeReader {
        async fn read(&self, gauge: Gauge) -> anyhow::Result<i64> {
            Ok(self.gauges.lock().unwrap()[gauge.as_str()])
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        sent: Mutex<Vec<String>>,
    }

    impl NotifySink for FakeNotifier {
        fn notify(&self, title: &str, _content: &str) {
            self.sent.lock().unwrap().push(title.to_string());
        }
    }

    struct Harness {
        arbiter: ResourceArbiter,
        registry: Arc<JobRegistry>,
        reader: Arc<FakeReader>,
        notifier: Arc<FakeNotifier>,
    }

    fn harness(currency: i64, stamina: i64, config: ArbiterSection) -> Harness {
        let registry = Arc::new(JobRegistry::from_config(&WorkerConfig::default()));
        let reader = FakeReader::new(currency, stamina);
        let notifier = Arc::new(FakeNotifier::default());
        let arbiter = ResourceArbiter::new(
            Arc::clone(&registry),
            Arc::clone(&reader) as Arc<dyn ResourceReader>,
            Arc::clone(&notifier) as Arc<dyn NotifySink>,
            config,
        );
        Harness {
            arbiter,
            registry,
            reader,
            notifier,
        }
    }

    fn low_stamina_config() -> ArbiterSection {
        ArbiterSection {
            substitute_stamina_reserve: 500,
            ..ArbiterSection::default()
        }
    }

    /// Currency below reserve with enough stamina
    /// enables the whole substitute set and suspends the primary.
    #[tokio::test]
    async fn low_currency_hands_off_and_suspends_primary() {
        let mut h = harness(900, 2000, low_stamina_config());
        for s in JobId::SUBSTITUTES {
            h.registry.set_enabled(s, false);
        }

        let decision = h.arbiter.checkpoint(JobId::Leveling).await.unwrap();
        assert_eq!(decision, Decision::HandOff { to: JobId::Salvage });
        for s in JobId::SUBSTITUTES {
            assert!(h.registry.is_enabled(s));
        }
        assert!(h.registry.get(JobId::Leveling).next_run > Utc::now());
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    /// Once currency clears the return threshold
    /// the substitutes are disabled and the primary resumes.
    #[tokio::test]
    async fn replenished_currency_hands_back() {
        let mut h = harness(900, 2000, low_stamina_config());
        h.arbiter.checkpoint(JobId::Leveling).await.unwrap();

        h.reader.set(Gauge::Currency, 1600);
        let decision = h.arbiter.checkpoint(JobId::Salvage).await.unwrap();
        assert_eq!(decision, Decision::ResumePrimary);
        for s in JobId::SUBSTITUTES {
            assert!(!h.registry.is_enabled(s));
        }
        assert!(h.registry.get(JobId::Leveling).is_due(Utc::now()));
    }

    /// Inside the hysteresis band nothing hands back; a dip below the
    /// reserve hands off.
    #[tokio::test]
    async fn hysteresis_band_holds_the_substitute() {
        let mut h = harness(900, 2000, low_stamina_config());
        h.arbiter.checkpoint(JobId::Leveling).await.unwrap();

        for level in [1000, 1400, 1000, 1399] {
            h.reader.set(Gauge::Currency, level);
            let decision = h.arbiter.checkpoint(JobId::Salvage).await.unwrap();
            assert_eq!(decision, Decision::Stay, "band level {level} must hold");
        }

        h.reader.set(Gauge::Currency, 999);
        let decision = h.arbiter.checkpoint(JobId::Leveling).await.unwrap();
        assert!(matches!(decision, Decision::HandOff { .. }));
    }

    /// Starvation stalls with one notification and never turns fatal.
    #[tokio::test]
    async fn starvation_stalls_and_notifies_once() {
        let mut h = harness(900, 100, ArbiterSection::default());

        for _ in 0..5 {
            let decision = h.arbiter.checkpoint(JobId::Leveling).await.unwrap();
            assert!(matches!(decision, Decision::Stall { .. }));
        }
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);

        // Condition clears: the latch re-arms.
        h.reader.set(Gauge::Stamina, 2000);
        h.arbiter.checkpoint(JobId::Leveling).await.unwrap();
        h.reader.set(Gauge::Currency, 1600);
        h.arbiter.checkpoint(JobId::Salvage).await.unwrap();
        h.reader.set(Gauge::Currency, 900);
        h.reader.set(Gauge::Stamina, 100);
        let decision = h.arbiter.checkpoint(JobId::Leveling).await.unwrap();
        assert!(matches!(decision, Decision::Stall { .. }));
    }

    /// An admissible substitute that is already running is left alone
    /// while currency is low.
    #[tokio::test]
    async fn running_substitute_is_not_churned_while_currency_is_low() {
        let mut h = harness(900, 2000, low_stamina_config());
        h.arbiter.checkpoint(JobId::Leveling).await.unwrap();
        let decision = h.arbiter.checkpoint(JobId::Salvage).await.unwrap();
        assert_eq!(decision, Decision::Stay);
    }

    /// A substitute that dropped below its own stamina floor is switched
    /// away from and parked in the same batch, so the dispatcher cannot
    /// re-pick it; a repeat switch in the same episode stays quiet.
    #[tokio::test]
    async fn exhausted_substitute_is_parked_and_handed_off_quietly() {
        let config = ArbiterSection {
            substitute_stamina_reserve: 500,
            substitute_stamina_overrides: HashMap::from([(JobId::Salvage, 3000)]),
            ..ArbiterSection::default()
        };
        let mut h = harness(900, 2000, config);
        let decision = h.arbiter.checkpoint(JobId::Salvage).await.unwrap();
        assert_eq!(decision, Decision::HandOff { to: JobId::Convoy });
        assert!(!h.registry.is_enabled(JobId::Salvage));
        assert!(h.registry.is_enabled(JobId::Convoy));
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);

        let decision = h.arbiter.checkpoint(JobId::Salvage).await.unwrap();
        assert_eq!(decision, Decision::HandOff { to: JobId::Convoy });
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn idle_substitute_rotates_in_fixed_order_with_wrap() {
        let mut h = harness(900, 2000, low_stamina_config());
        h.arbiter.checkpoint(JobId::Leveling).await.unwrap();

        let decision = h.arbiter.substitute_idle(JobId::Bounty).await.unwrap();
        assert_eq!(decision, Decision::HandOff { to: JobId::Forage });
        assert!(!h.registry.is_enabled(JobId::Bounty));

        // Forage idle too: the scan wraps past the already-idle Bounty.
        let decision = h.arbiter.substitute_idle(JobId::Forage).await.unwrap();
        assert_eq!(decision, Decision::HandOff { to: JobId::Salvage });
    }

    #[tokio::test]
    async fn all_idle_hands_back_regardless_of_currency() {
        let mut h = harness(900, 2000, low_stamina_config());
        h.arbiter.checkpoint(JobId::Leveling).await.unwrap();

        h.arbiter.substitute_idle(JobId::Salvage).await.unwrap();
        h.arbiter.substitute_idle(JobId::Convoy).await.unwrap();
        h.arbiter.substitute_idle(JobId::Bounty).await.unwrap();
        let decision = h.arbiter.substitute_idle(JobId::Forage).await.unwrap();
        assert_eq!(decision, Decision::ResumePrimary);
        assert!(h.registry.get(JobId::Leveling).is_due(Utc::now()));
    }

    /// An idle substitute is eligible again on the next hand-off cycle.
    #[tokio::test]
    async fn idle_scan_resets_on_the_next_cycle() {
        let mut h = harness(900, 2000, low_stamina_config());
        h.arbiter.checkpoint(JobId::Leveling).await.unwrap();
        h.arbiter.substitute_idle(JobId::Salvage).await.unwrap();

        // Hand back, then a fresh hand-off cycle: salvage leads again.
        h.reader.set(Gauge::Currency, 1600);
        h.arbiter.checkpoint(JobId::Convoy).await.unwrap();
        h.reader.set(Gauge::Currency, 900);
        let decision = h.arbiter.checkpoint(JobId::Leveling).await.unwrap();
        assert_eq!(decision, Decision::HandOff { to: JobId::Salvage });
    }

    /// A zero margin disables currency gating; only stamina admission
    /// remains.
    #[tokio::test]
    async fn zero_margin_disables_currency_gating() {
        let config = ArbiterSection {
            currency_return_margin: 0,
            ..ArbiterSection::default()
        };
        let mut h = harness(0, 2000, config);

        let decision = h.arbiter.checkpoint(JobId::Leveling).await.unwrap();
        assert_eq!(decision, Decision::Stay);

        h.reader.set(Gauge::Stamina, 100);
        let decision = h.arbiter.checkpoint(JobId::Leveling).await.unwrap();
        assert!(matches!(decision, Decision::Stall { .. }));
    }

    /// Zero configured substitutes is the no-progress branch, not an
    /// error.
    #[tokio::test]
    async fn empty_substitute_set_is_treated_as_starvation() {
        let config = ArbiterSection {
            substitutes: Vec::new(),
            ..ArbiterSection::default()
        };
        let mut h = harness(900, 5000, config);
        let decision = h.arbiter.checkpoint(JobId::Leveling).await.unwrap();
        assert!(matches!(decision, Decision::Stall { .. }));
    }

    /// Stall re-checks never fire earlier than an externally imposed
    /// cooldown.
    #[tokio::test]
    async fn stall_reconciles_against_the_cooldown_registry() {
        let mut h = harness(900, 100, ArbiterSection::default());
        let far = Utc::now() + Duration::hours(6);
        for id in JobId::ALL {
            h.registry.set_next_run(id, far);
        }
        let decision = h.arbiter.checkpoint(JobId::Leveling).await.unwrap();
        match decision {
            Decision::Stall { until } => assert_eq!(until, far),
            other => panic!("expected stall, got {other:?}"),
        }
    }
}
