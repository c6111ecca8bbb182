//! Retry policy with exponential backoff and jitter.
//!
//! The network client retries retryable failures (transport errors and
//! 5xx responses) until the policy is exhausted. Base delays double per
//! attempt so consecutive delays are strictly increasing below the cap;
//! jitter is strictly smaller than the base delay so it never reorders
//! them. Jitter prevents a thundering herd of devices reconnecting in
//! lockstep after a relay outage.

use std::time::Duration;

/// Exponential backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first failure before giving up.
    pub max_retries: u32,
    /// Delay before the first retry; doubles per attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay (before jitter).
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Base delay before retry `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(32);
        let factor = 2u64.saturating_pow(doublings);
        let delay = self.base_delay.saturating_mul(factor.min(u32::MAX as u64) as u32);
        delay.min(self.max_delay)
    }

    /// Base delay plus random jitter in `[0, base_delay)`.
    ///
    /// The jitter bound keeps delays strictly increasing across attempts
    /// below the cap.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        self.delay_for_attempt(attempt) + self.jitter()
    }

    /// Whether a failure on retry `attempt` exhausts the policy.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_retries
    }

    /// Delay to advertise as "next retry at" once the policy is exhausted.
    ///
    /// One step past the final attempt, so the countdown the UI displays
    /// keeps growing with repeated outages instead of snapping back.
    pub fn exhausted_delay(&self) -> Duration {
        self.delay_for_attempt(self.max_retries + 1)
    }

    fn jitter(&self) -> Duration {
        let bound = self.base_delay.as_millis().max(1) as u64;
        let mut bytes = [0u8; 8];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Duration::from_millis(u64::from_le_bytes(bytes) % bound)
    }
}
