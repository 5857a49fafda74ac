//! `autohelm-arbiter` — cross-job resource arbitration.
//!
//! Decides, at checkpoints, whether control stays with the primary job or
//! moves to one of the substitutes that regenerate currency at the cost of
//! stamina. Hand-back is protected by a hysteresis margin so the worker
//! does not flap between jobs while currency hovers around the reserve.

mod arbiter;

pub use arbiter::{Decision, ResourceArbiter};
