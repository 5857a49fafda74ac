//! `autohelm-notify` — outbound side channels.
//!
//! Webhook notifications and diagnostic report submission. Everything in
//! this crate is fire-and-forget: dispatch happens on spawned tasks and
//! failures are logged, never propagated into the scheduler.

mod diagnostics;
mod webhook;

pub use diagnostics::DiagnosticSink;
pub use webhook::WebhookNotifier;
