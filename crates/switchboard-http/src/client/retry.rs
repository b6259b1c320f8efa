//! Reconnect policy for push connections.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long to wait before re-opening a push connection after a non-clean close.
/// Attempts are unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(3))
    }
}

impl ReconnectPolicy {
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }
}

/// Attempt counter for one connection, cleared on every successful open.
#[derive(Debug, Clone)]
pub struct RetryState {
    pub attempts: u32,
    policy: ReconnectPolicy,
}

impl RetryState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            attempts: 0,
            policy,
        }
    }

    /// Count a non-clean close and return the wait before reconnecting.
    pub fn next_attempt(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        self.policy.delay
    }

    /// Called once a connection is established.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
