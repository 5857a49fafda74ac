//! Cooperative stop signal.
//!
//! A single-writer watch channel polled between jobs and at every timed
//! wait. Cancellation never interrupts a job mid-execution; bodies are not
//! guaranteed safe to interrupt, so the token is only consulted at
//! checkpoints the scheduler itself owns.

use std::time::Duration;

use tokio::sync::watch;

/// Writer side, held by whoever decides shutdown (ctrl-c handler, tests).
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        // Receivers may already be gone during teardown; nothing to do then.
        let _ = self.tx.send(true);
    }
}

/// Reader side, checked at the top of every loop iteration and at every
/// wake from a timed wait.
#[derive(Debug, Clone)]
pub struct StopToken {
    rx: watch::Receiver<bool>,
}

impl StopToken {
    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the stop flag is raised. A dropped sender counts as a
    /// stop request.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `dur`, returning early when stop is requested.
    ///
    /// Returns `true` when the sleep was interrupted by stop.
    pub async fn sleep(&mut self, dur: Duration) -> bool {
        if self.is_set() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(dur) => false,
            _ = self.wait() => true,
        }
    }
}

pub fn stop_channel() -> (StopHandle, StopToken) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopToken { rx })
}
