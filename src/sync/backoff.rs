//! Bounded exponential backoff.

use std::time::Duration;

/// Exponential delay policy: base doubling per attempt, capped at a maximum.
///
/// The attempt counter is part of the value; call [`Backoff::reset`] after a
/// success so the next failure starts from the base delay again.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// The delay before the next retry, advancing the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Restart from the base delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive failures recorded since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // Shift clamp keeps the multiplier from overflowing u64.
        let multiplier = 1u64 << attempt.min(20);
        let millis = (self.base.as_millis() as u64).saturating_mul(multiplier);
        Duration::from_millis(millis).min(self.cap)
    }
}
