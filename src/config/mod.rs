//! Engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for the registration engine.
///
/// All timeouts follow the defaults device-management deployments expect:
/// 2 minutes for requests, 1 second for deregistration on shutdown, 93
/// seconds for a bootstrap session and 10 minutes between retries of a
/// failed bootstrap or registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout for register, update and bootstrap requests, in seconds.
    pub request_timeout_secs: u64,
    /// Timeout for the deregister sent on shutdown, in milliseconds.
    /// Shutdown should not hang on an unreachable server.
    pub deregistration_timeout_millis: u64,
    /// How long a bootstrap session may take end to end, in seconds.
    pub bootstrap_session_timeout_secs: u64,
    /// Wait between retries after a failed bootstrap or a registration
    /// timeout, in seconds.
    pub retry_wait_secs: u64,
    /// Overrides the lifetime-based update schedule when set, in seconds.
    pub communication_period_secs: Option<u64>,
    /// Recreate the connection before each registration update.
    pub reconnect_on_update: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
            deregistration_timeout_millis: 1000,
            bootstrap_session_timeout_secs: 93,
            retry_wait_secs: 600,
            communication_period_secs: None,
            reconnect_on_update: false,
        }
    }
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn deregistration_timeout(&self) -> Duration {
        Duration::from_millis(self.deregistration_timeout_millis)
    }

    pub fn bootstrap_session_timeout(&self) -> Duration {
        Duration::from_secs(self.bootstrap_session_timeout_secs)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs(self.retry_wait_secs)
    }

    /// Delay until the next registration update for a registration with
    /// the given lifetime. Updates fire at 90% of the lifetime so the
    /// registration never lapses while an update is in flight.
    pub fn next_update_delay(&self, lifetime_secs: u64) -> Duration {
        match self.communication_period_secs {
            Some(period) => Duration::from_secs(period),
            None => Duration::from_millis(lifetime_secs * 900),
        }
    }
}
