//! Reconnection policy: exponential backoff with an attempt ceiling.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of automatic reconnection attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first reconnection attempt, in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt in milliseconds; doubles per attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Create a new policy.
    #[must_use]
    pub const fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay_ms: base_delay.as_millis() as u64,
            max_attempts,
        }
    }

    /// Get the base delay.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Delay before attempt number `attempt` (0-based): `base * 2^attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay().saturating_mul(factor)
    }
}

/// Reconnection progress of one channel manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectState {
    attempts: u32,
}

impl ReconnectState {
    /// Create a fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts made since the last successful open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay to wait before the next attempt, or `None` once the ceiling is hit.
    #[must_use]
    pub fn next_delay(&self, policy: &ReconnectPolicy) -> Option<Duration> {
        (self.attempts < policy.max_attempts).then(|| policy.delay_for(self.attempts))
    }

    /// Record that a scheduled attempt is starting.
    pub fn advance(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Forget all attempts, after a successful open or an explicit connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
