//! `autohelm-core` — shared types, config, error taxonomy and trait seams.
//!
//! Everything the worker needs to talk about without caring how it is
//! implemented lives here: the closed set of [`types::JobId`]s, the
//! [`error::JobFault`] taxonomy that job bodies classify into, the
//! [`bridge`] traits behind which the device-automation layer sits, and
//! the figment-backed [`config::WorkerConfig`].

pub mod bridge;
pub mod config;
pub mod error;
pub mod stop;
pub mod types;

pub use bridge::{BackendProbe, Diagnostics, EmulatorControl, JobBody, NotifySink, ResourceReader};
pub use config::WorkerConfig;
pub use error::{ConfigError, FatalReason, JobFault};
pub use stop::{stop_channel, StopHandle, StopToken};
pub use types::{Gauge, Job, JobId, JobOutcome, JobRole};
