//! Bootstrap session guard
//!
//! A bootstrap session spans the bootstrap request, the writes the
//! bootstrap server performs on the client and the final bootstrap
//! finish. Only one session may run at a time, and whoever handles the
//! finish message signals it here so the engine can resume registration.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};

use crate::lock;

/// Tracks whether a bootstrap session is in progress.
#[derive(Debug, Default)]
pub struct BootstrapHandler {
    in_session: Mutex<bool>,
    finished: Notify,
}

impl BootstrapHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the session. Returns false when another session is already
    /// running, in which case the caller must back off.
    pub fn try_init_session(&self) -> bool {
        let mut in_session = lock(&self.in_session);
        if *in_session {
            return false;
        }
        *in_session = true;
        true
    }

    pub fn is_bootstrapping(&self) -> bool {
        *lock(&self.in_session)
    }

    /// Mark the running session finished. Called by the transport when
    /// the bootstrap finish request arrives.
    pub fn finish_session(&self) {
        let mut in_session = lock(&self.in_session);
        *in_session = false;
        self.finished.notify_waiters();
    }

    /// Release the session claim without declaring success. Safe to call
    /// when no session is running.
    pub fn close_session(&self) {
        self.finish_session();
    }

    /// Wait until the running session finishes. Returns false on timeout.
    pub async fn wait_finished(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            // Arm the waiter before checking, so a finish arriving in
            // between is not lost.
            let notified = self.finished.notified();
            if !self.is_bootstrapping() {
                return true;
            }
            if timeout_at(deadline, notified).await.is_err() {
                return false;
            }
        }
    }
}
