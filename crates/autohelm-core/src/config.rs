use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::JobId;

/// Seconds the emulator is given to settle between stop and start.
pub const EMULATOR_SETTLE_SECS: u64 = 5;
/// Fixed cool-down applied after an app relaunch was scheduled for a
/// stuck/glitch fault without an emulator restart.
pub const FAULT_COOLDOWN_SECS: u64 = 10;
/// Slice length for interruptible waits on a job's due time.
pub const DUE_WAIT_SLICE_SECS: u64 = 5;

/// Top-level config (autohelm.toml + AUTOHELM_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkerConfig {
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub faults: FaultsSection,
    #[serde(default)]
    pub emulator: EmulatorSection,
    #[serde(default)]
    pub arbiter: ArbiterSection,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub notify: NotifySection,
    #[serde(default)]
    pub jobs: JobsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    /// Instance label, prefixed to every notification title.
    #[serde(default = "default_instance")]
    pub instance: String,
    /// Directory diagnostic reports are written to.
    #[serde(default = "default_diagnostics_dir")]
    pub diagnostics_dir: String,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            diagnostics_dir: default_diagnostics_dir(),
        }
    }
}

/// Failure budgets and global-exception backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultsSection {
    /// Consecutive unrecoverable failures a job may accumulate before the
    /// worker requests human takeover.
    #[serde(default = "default_three")]
    pub failure_threshold: u32,
    /// Jobs whose threshold is overridden down to 1. Same mechanism,
    /// different constant.
    #[serde(default)]
    pub strict: Vec<JobId>,
    /// Consecutive unclassified scheduler failures before termination.
    #[serde(default = "default_three")]
    pub global_failure_threshold: u32,
    /// Backoff after an unclassified failure while the count is below 4.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
    /// Backoff once unclassified failures reach 4, to ride out network
    /// instability.
    #[serde(default = "default_long_backoff")]
    pub long_backoff_secs: u64,
    /// Write diagnostic reports on faults.
    #[serde(default = "bool_true")]
    pub save_diagnostics: bool,
    /// Default re-run delay in minutes applied when a job finished without
    /// moving its own schedule.
    #[serde(default = "default_rerun_delay")]
    pub rerun_delay_mins: u64,
}

impl Default for FaultsSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_three(),
            strict: Vec::new(),
            global_failure_threshold: default_three(),
            retry_backoff_secs: default_retry_backoff(),
            long_backoff_secs: default_long_backoff(),
            save_diagnostics: true,
            rerun_delay_mins: default_rerun_delay(),
        }
    }
}

/// Emulator self-healing knobs. The stuck and offline fault classes are
/// tracked independently, each with its own threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmulatorSection {
    #[serde(default = "bool_true")]
    pub stuck_restart: bool,
    #[serde(default = "default_three")]
    pub stuck_threshold: u32,
    #[serde(default = "bool_true")]
    pub offline_restart: bool,
    #[serde(default = "default_three")]
    pub offline_threshold: u32,
    /// Periodic maintenance restart, fired only between jobs.
    #[serde(default)]
    pub scheduled_restart: bool,
    #[serde(default = "default_restart_interval")]
    pub restart_interval_hours: u64,
}

impl Default for EmulatorSection {
    fn default() -> Self {
        Self {
            stuck_restart: true,
            stuck_threshold: default_three(),
            offline_restart: true,
            offline_threshold: default_three(),
            scheduled_restart: false,
            restart_interval_hours: default_restart_interval(),
        }
    }
}

/// Cross-job resource arbitration ("smart scheduling").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterSection {
    /// Currency level below which the primary hands off to substitutes.
    #[serde(default = "default_currency_reserve")]
    pub currency_reserve: i64,
    /// Hysteresis margin: hand-back requires `reserve + margin`. Zero
    /// disables currency-based gating entirely.
    #[serde(default = "default_currency_margin")]
    pub currency_return_margin: i64,
    /// Minimum stamina the primary keeps in reserve.
    #[serde(default = "default_primary_stamina")]
    pub primary_stamina_reserve: i64,
    /// Default stamina admission floor for substitutes.
    #[serde(default = "default_substitute_stamina")]
    pub substitute_stamina_reserve: i64,
    /// Per-substitute overrides of the admission floor.
    #[serde(default)]
    pub substitute_stamina_overrides: HashMap<JobId, i64>,
    /// Cool-down applied when no job can progress, and while the primary
    /// is suspended after a hand-off.
    #[serde(default = "default_stall_cooldown")]
    pub stall_cooldown_mins: i64,
    /// Substitutes participating in arbitration. Evaluated in the fixed
    /// priority order of [`JobId::SUBSTITUTES`] regardless of list order.
    #[serde(default = "default_substitutes")]
    pub substitutes: Vec<JobId>,
}

impl Default for ArbiterSection {
    fn default() -> Self {
        Self {
            currency_reserve: default_currency_reserve(),
            currency_return_margin: default_currency_margin(),
            primary_stamina_reserve: default_primary_stamina(),
            substitute_stamina_reserve: default_substitute_stamina(),
            substitute_stamina_overrides: HashMap::new(),
            stall_cooldown_mins: default_stall_cooldown(),
            substitutes: default_substitutes(),
        }
    }
}

impl ArbiterSection {
    /// Hand-back threshold (reserve + hysteresis margin).
    pub fn currency_return_threshold(&self) -> i64 {
        self.currency_reserve + self.currency_return_margin
    }

    /// Stamina admission floor for one substitute.
    pub fn stamina_reserve_for(&self, job: JobId) -> i64 {
        self.substitute_stamina_overrides
            .get(&job)
            .copied()
            .unwrap_or(self.substitute_stamina_reserve)
    }
}

/// Backend status probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSection {
    /// Status endpoint; unset means the backend is assumed available.
    pub status_url: Option<String>,
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            status_url: None,
            probe_interval_secs: default_probe_interval(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

/// Local device-automation agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSection {
    #[serde(default = "default_bridge_url")]
    pub base_url: String,
    /// Timeout for control-plane calls (gauges, emulator lifecycle).
    /// Job invocations are not bounded here; inner loops bound themselves.
    #[serde(default = "default_bridge_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            base_url: default_bridge_url(),
            request_timeout_secs: default_bridge_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifySection {
    /// Webhook receiving JSON notifications; unset disables pushes.
    pub webhook_url: Option<String>,
    /// Diagnostics upload endpoint; unset keeps reports local.
    pub report_url: Option<String>,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            webhook_url: None,
            report_url: None,
            enabled: true,
        }
    }
}

/// Which jobs exist at startup. Every [`JobId`] gets a registry entry;
/// listed ids start disabled.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobsSection {
    #[serde(default)]
    pub disabled: Vec<JobId>,
}

impl WorkerConfig {
    /// Load from `config_path` (or `$AUTOHELM_CONFIG`, or
    /// `./autohelm.toml`) with `AUTOHELM_*` env overrides, then validate.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("AUTOHELM_CONFIG").ok())
            .unwrap_or_else(|| "autohelm.toml".to_string());

        let config: WorkerConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("AUTOHELM_").split("_"))
            .extract()
            .map_err(|e| ConfigError::Extract(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Invariant checks figment cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.faults.failure_threshold == 0 {
            return Err(ConfigError::Invalid("faults.failure_threshold must be >= 1".into()));
        }
        if self.faults.global_failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "faults.global_failure_threshold must be >= 1".into(),
            ));
        }
        if self.arbiter.currency_return_margin < 0 {
            // return_threshold >= reserve is the hysteresis invariant.
            return Err(ConfigError::Invalid(
                "arbiter.currency_return_margin must not be negative".into(),
            ));
        }
        for job in &self.arbiter.substitutes {
            if !JobId::SUBSTITUTES.contains(job) {
                return Err(ConfigError::Invalid(format!(
                    "arbiter.substitutes: `{job}` is not a substitute job"
                )));
            }
        }
        for job in &self.faults.strict {
            if *job == JobId::Restart {
                return Err(ConfigError::Invalid(
                    "faults.strict: the recovery job has no failure budget".into(),
                ));
            }
        }
        Ok(())
    }

    /// Effective per-job failure threshold (strict jobs drop to 1).
    pub fn failure_threshold_for(&self, job: JobId) -> u32 {
        if self.faults.strict.contains(&job) {
            1
        } else {
            self.faults.failure_threshold
        }
    }
}

fn default_instance() -> String {
    "autohelm".to_string()
}
fn default_diagnostics_dir() -> String {
    "log/error".to_string()
}
fn default_three() -> u32 {
    3
}
fn default_retry_backoff() -> u64 {
    20
}
fn default_long_backoff() -> u64 {
    300
}
fn default_rerun_delay() -> u64 {
    30
}
fn default_restart_interval() -> u64 {
    24
}
fn default_currency_reserve() -> i64 {
    1000
}
fn default_currency_margin() -> i64 {
    500
}
fn default_primary_stamina() -> i64 {
    200
}
fn default_substitute_stamina() -> i64 {
    1000
}
fn default_stall_cooldown() -> i64 {
    60
}
fn default_substitutes() -> Vec<JobId> {
    JobId::SUBSTITUTES.to_vec()
}
fn default_probe_interval() -> u64 {
    30
}
fn default_probe_timeout() -> u64 {
    10
}
fn default_bridge_url() -> String {
    "http://127.0.0.1:7912".to_string()
}
fn default_bridge_timeout() -> u64 {
    30
}
fn bool_true() -> bool {
    true
}
