//! Tick scheduling with exponential backoff.
//!
//! The fetch loop sleeps the base interval between ticks. After a tick that
//! hit a retriable error it sleeps `base`, then `2 * base`, `4 * base`, ...
//! capped at `max`. The first clean tick resets the sequence.

use std::time::Duration;

/// Exponential backoff with a cap, reset on success.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl BackoffPolicy {
    /// Multiplier applied after each consecutive failed tick.
    pub const MULTIPLIER: u32 = 2;

    /// Create a policy. `max` is raised to `base` if it is smaller.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: None,
        }
    }

    /// Sleep duration after a tick.
    ///
    /// `retriable_failure` tells whether the tick saw a retriable error.
    pub fn next_delay(&mut self, retriable_failure: bool) -> Duration {
        if !retriable_failure {
            self.reset();
            return self.base;
        }

        let next = match self.current {
            None => self.base,
            Some(previous) => previous.saturating_mul(Self::MULTIPLIER).min(self.max),
        };
        self.current = Some(next);
        next
    }

    /// Forget any accumulated backoff.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Whether the last tick left the policy backing off.
    pub fn is_backing_off(&self) -> bool {
        self.current.is_some()
    }

    /// The sleep between healthy ticks.
    pub fn base(&self) -> Duration {
        self.base
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(10 * 60))
    }
}
