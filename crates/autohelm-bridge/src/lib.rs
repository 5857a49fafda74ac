//! `autohelm-bridge` — HTTP implementations of the core trait seams.
//!
//! The device-automation agent (screen capture, input synthesis, emulator
//! lifecycle) runs as a separate local process and exposes a small HTTP
//! API. This crate maps that API onto the `autohelm-core` traits: job
//! invocations with fault classification, emulator control, gauge reads
//! and the backend availability probe.

mod client;
mod status;

pub use client::BridgeClient;
pub use status::HttpBackendProbe;
