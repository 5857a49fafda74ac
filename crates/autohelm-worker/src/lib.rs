//! `autohelm-worker` — the `autohelm` binary and its scheduler loop.
//!
//! Wires the bridge, probe, notifier and diagnostics implementations into
//! the registry/runner/arbiter stack and drives the single-threaded job
//! loop until a stop request or a fatal condition.

pub mod failure;
pub mod scheduler;

pub use scheduler::{ExitReason, Scheduler};
