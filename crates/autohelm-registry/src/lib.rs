//! `autohelm-registry` — the in-memory job table.
//!
//! One entry per job id: enabled flag, next-run time, role. The
//! scheduler loop and the arbiter mutate it for the lifetime of the
//! process; nothing is persisted. Batched mutations go through
//! [`Batch`] and are applied under a single write guard, so concurrent
//! readers never observe a partially-applied batch.

mod registry;

pub use registry::{Batch, JobRegistry};
