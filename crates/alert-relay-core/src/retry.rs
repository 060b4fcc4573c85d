//! # Reconnect Backoff
//!
//! Exponential backoff with jitter for long-lived connections (the chat
//! transport) that must be re-established after a drop.

use rand::Rng;
use std::time::Duration;

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;

/// Backoff policy for reconnect attempts
///
/// # Examples
///
/// ```rust
/// use alert_relay_core::retry::RetryPolicy;
/// use std::time::Duration;
///
/// // Retry forever: 1s initial, 30s max, doubling each time
/// let policy = RetryPolicy::default();
/// assert!(policy.should_retry(10_000));
///
/// // Bounded policy
/// let policy = RetryPolicy::new(Duration::from_millis(500), Duration::from_secs(5), 1.5)
///     .with_max_attempts(3);
/// assert!(!policy.should_retry(3));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,

    /// Jitter as a fraction of the delay (0.25 = ±25%); zero disables it
    pub jitter_percent: f64,

    /// Maximum number of retries; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_percent: 0.25,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter_percent = 0.0;
        self
    }

    /// Set the jitter fraction, clamped to `0.0..=1.0`.
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// `initial * multiplier^attempt`, capped at `max_delay`, then jittered.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let delay = if self.jitter_percent > 0.0 {
            Self::add_jitter(capped, self.jitter_percent)
        } else {
            capped
        };

        Duration::from_secs_f64(delay)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }

    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let range = delay_secs * jitter_percent;
        if range <= 0.0 {
            return delay_secs;
        }
        let jitter = rand::thread_rng().gen_range(-range..=range);
        (delay_secs + jitter).max(0.0)
    }
}

/// Running backoff state for one connection
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Retries made since the last [`reset`](Self::reset).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next retry, or `None` once the policy is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.policy.should_retry(self.attempt) {
            return None;
        }
        let delay = self.policy.calculate_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
