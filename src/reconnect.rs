//! Reconnect policy.
//!
//! Implements capped exponential backoff between reconnect attempts.

use std::time::Duration;

/// Backoff parameters for reconnecting a dropped session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Cap for the exponential growth.
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
        }
    }

    /// Delay before the retry following `failures` consecutive failed
    /// attempts (1-based): `initial * 2^(failures - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            failures: 0,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        }
    }
}

/// Stateful iterator over backoff delays for one reconnect sequence.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    failures: u32,
}

impl Backoff {
    /// Records a failed attempt and returns how long to wait before the next.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.policy.delay_for(self.failures)
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
