//! Trait seams for everything outside the scheduler core.
//!
//! Image recognition, UI navigation, emulator mechanics and the backend all
//! live behind these traits; the scheduler only ever sees the narrow
//! contracts below. Production implementations are in `autohelm-bridge`
//! and `autohelm-notify`; tests script them.

use async_trait::async_trait;

use crate::error::JobFault;
use crate::stop::StopToken;
use crate::types::{Gauge, JobId, JobOutcome};

/// Executes one job invocation against the controlled app.
///
/// Must classify what it can into [`JobFault`]; only genuinely unclassified
/// conditions may come back as [`JobFault::Unexpected`].
#[async_trait]
pub trait JobBody: Send + Sync {
    async fn invoke(&self, id: JobId) -> Result<JobOutcome, JobFault>;
}

/// Emulator lifecycle control. Both operations are fallible; callers log
/// failures instead of propagating them.
#[async_trait]
pub trait EmulatorControl: Send + Sync {
    async fn stop(&self) -> anyhow::Result<()>;
    async fn start(&self) -> anyhow::Result<()>;
}

/// Active backend availability probe.
#[async_trait]
pub trait BackendProbe: Send + Sync {
    /// Probe right now and update the cached availability state.
    async fn check_now(&self) -> bool;

    /// Last probed availability.
    fn is_available(&self) -> bool;

    /// True exactly once after availability was regained; consumed by the
    /// caller.
    fn is_recovered(&self) -> bool;

    /// Block in bounded polls until the backend is available or stop is
    /// requested.
    async fn wait_until_available(&self, stop: &mut StopToken);
}

/// Fresh gauge reads; values are never cached across checkpoints.
#[async_trait]
pub trait ResourceReader: Send + Sync {
    async fn read(&self, gauge: Gauge) -> anyhow::Result<i64>;
}

/// Fire-and-forget notification sink. Implementations dispatch off the
/// critical path and swallow (log) their own failures.
pub trait NotifySink: Send + Sync {
    fn notify(&self, title: &str, content: &str);
}

/// Best-effort diagnostics capture and submission. Never blocks the
/// scheduler and never prevents shutdown.
pub trait Diagnostics: Send + Sync {
    fn capture_and_submit(&self, context: &str);
}
