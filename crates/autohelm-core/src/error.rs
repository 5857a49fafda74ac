use thiserror::Error;

use crate::types::JobId;

/// A classified job failure, produced as close to its origin as possible.
///
/// This is the boundary where heterogeneous device/app failures become a
/// uniform contract. Bodies must classify what they can; only genuinely
/// unclassified conditions travel as [`JobFault::Unexpected`], which the
/// runner treats as doubly suspicious (counted per-job *and* globally).
#[derive(Debug, Error)]
pub enum JobFault {
    /// The controlled app is not running. Self-healing: schedule the
    /// recovery job and carry on.
    #[error("app is not running")]
    AppNotRunning,

    /// The app stopped responding to input, or a single action was repeated
    /// past its sanity limit.
    #[error("app stuck: {0}")]
    AppStuck(String),

    /// A glitch inside the app itself that the worker cannot navigate
    /// around. A relaunch usually clears it.
    #[error("app glitch: {0}")]
    AppGlitch(String),

    /// The job landed somewhere it cannot recognise, which usually means
    /// backend maintenance or a broken network. Must be confirmed by an
    /// active probe before deciding anything.
    #[error("unrecognised app state, backend suspected")]
    BackendSuspect,

    /// The emulator (or the whole automation host) is unreachable.
    #[error("emulator offline")]
    EmulatorOffline,

    /// Invalid configuration or a violated invariant. Retrying cannot fix
    /// this class; it escalates immediately.
    #[error("contract violation: {0}")]
    Contract(String),

    /// A failure the body classified itself as unrecoverable. Counted
    /// against the job's failure budget only.
    #[error("job failed ({kind}): {detail}")]
    Failed { kind: String, detail: String },

    /// Anything the body could not classify.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Why the worker is terminating with exit code 1.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalReason {
    #[error("job `{job}` failed {count} consecutive times")]
    JobFailureLimit { job: JobId, count: u32 },

    #[error("{count} consecutive unhandled scheduler failures")]
    GlobalFailureLimit { count: u32 },

    /// The backend probe says everything is fine, yet the job could not
    /// find its way. That is a defect in the worker, not the environment.
    #[error("job `{job}` lost while the backend is reachable")]
    BackendHealthyDefect { job: JobId },

    #[error("contract violation: {0}")]
    Contract(String),

    /// The app kept getting stuck after repeated emulator restarts.
    #[error("app stuck {count} times, emulator restarts did not help")]
    StuckLimit { count: u32 },

    /// Emulator restart budget for the offline fault class is spent.
    #[error("emulator offline, restart limit ({limit}) reached")]
    RestartExhausted { limit: u32 },

    /// Emulator restart failed outright or is disabled by config.
    #[error("emulator offline and restart failed or disabled")]
    RestartUnavailable,
}

/// Configuration loading / validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Extract(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
