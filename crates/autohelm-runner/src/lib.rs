//! `autohelm-runner` — one job invocation, classified.
//!
//! [`JobRunner`] is the boundary where heterogeneous app/device failures
//! become the uniform four-way verdict the scheduler loop consumes.
//! [`EmulatorSupervisor`] owns the environment self-healing decisions:
//! per-fault-class restart counters and the periodic maintenance restart.

mod runner;
mod supervisor;

pub use runner::{JobRunner, Verdict};
pub use supervisor::{EmulatorSupervisor, OfflineAction, StuckAction};
