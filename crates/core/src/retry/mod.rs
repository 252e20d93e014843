//! Exponential backoff for failed media records.
//!
//! The policy is a set of pure functions over its parameters; nothing here
//! reads the clock except through the `now` arguments.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RetryConfig;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    /// Zero means automatic retries never run out.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(
        initial_delay: Duration,
        backoff_multiplier: f64,
        max_delay: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay,
            backoff_multiplier,
            max_delay,
            max_attempts,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_secs(config.initial_delay_secs),
            config.backoff_multiplier,
            Duration::from_secs(config.max_delay_secs),
            config.max_attempts,
        )
    }

    /// `min(initial_delay * backoff_multiplier^attempt_count, max_delay)`
    pub fn delay(&self, attempt_count: u32) -> Duration {
        let exponent = i32::try_from(attempt_count).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }

    pub fn next_eligible_at(
        &self,
        last_error_at: DateTime<Utc>,
        attempt_count: u32,
    ) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.delay(attempt_count))
            .unwrap_or_else(|_| chrono::Duration::MAX);
        last_error_at
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// No automatic retry is left.
    pub fn is_exhausted(&self, attempt_count: u32) -> bool {
        self.max_attempts > 0 && attempt_count >= self.max_attempts
    }

    pub fn is_eligible(
        &self,
        attempt_count: u32,
        last_error_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        !self.is_exhausted(attempt_count) && now >= self.next_eligible_at(last_error_at, attempt_count)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Retry bookkeeping embedded in a media record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    /// Processing attempts consumed since the last manual re-trigger.
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_eligible_at: Option<DateTime<Utc>>,
}

impl RetryState {
    /// Record a failed attempt at `at`.
    ///
    /// The first failure of a fresh record consumes its initial attempt.
    /// Attempts granted later are counted by [`RetryState::begin_retry`].
    pub fn record_failure(&mut self, policy: &RetryPolicy, at: DateTime<Utc>) {
        if self.attempt_count == 0 {
            self.attempt_count = 1;
        }
        self.next_eligible_at = if policy.is_exhausted(self.attempt_count) {
            None
        } else {
            Some(policy.next_eligible_at(at, self.attempt_count))
        };
    }

    /// Consume one automatic retry.
    pub fn begin_retry(&mut self) {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.next_eligible_at = None;
    }

    /// Forget all attempts; used by manual re-trigger.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
        self.next_eligible_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(h: u64) -> Duration {
        Duration::from_secs(h * 3600)
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(hours(1), 2.0, hours(24), 3)
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let p = policy();
        assert_eq!(p.delay(0), hours(1));
        assert_eq!(p.delay(1), hours(2));
        assert_eq!(p.delay(2), hours(4));
        assert_eq!(p.delay(10), hours(24));
        assert_eq!(p.delay(u32::MAX), hours(24));
    }

    #[test]
    fn test_delay_monotonic_and_bounded() {
        for multiplier in [1.0, 1.5, 2.0, 3.7] {
            let p = RetryPolicy::new(Duration::from_secs(90), multiplier, hours(6), 0);
            let mut prev = Duration::ZERO;
            for n in 0..200 {
                let d = p.delay(n);
                assert!(d >= prev, "delay decreased at n={n} for {multiplier}");
                assert!(d <= p.max_delay);
                prev = d;
            }
        }
    }

    #[test]
    fn test_eligibility_respects_delay() {
        let p = policy();
        let failed_at = Utc::now();
        assert!(!p.is_eligible(0, failed_at, failed_at));
        assert!(!p.is_eligible(0, failed_at, failed_at + chrono::Duration::minutes(59)));
        assert!(p.is_eligible(0, failed_at, failed_at + chrono::Duration::hours(1)));
    }

    #[test]
    fn test_never_eligible_at_max_attempts() {
        let p = policy();
        let failed_at = Utc::now() - chrono::Duration::days(3650);
        assert!(!p.is_eligible(3, failed_at, Utc::now()));
        assert!(!p.is_eligible(4, failed_at, Utc::now()));
    }

    #[test]
    fn test_zero_max_attempts_is_unlimited() {
        let p = RetryPolicy::new(hours(1), 2.0, hours(24), 0);
        let failed_at = Utc::now() - chrono::Duration::days(2);
        assert!(!p.is_exhausted(10_000));
        assert!(p.is_eligible(10_000, failed_at, Utc::now()));
    }

    #[test]
    fn test_state_exhausts_after_three_failures() {
        let p = policy();
        let mut state = RetryState::default();
        let t0 = Utc::now();

        state.record_failure(&p, t0);
        assert_eq!(state.attempt_count, 1);
        assert_eq!(state.next_eligible_at, Some(t0 + chrono::Duration::hours(2)));

        state.begin_retry();
        state.record_failure(&p, t0);
        assert_eq!(state.attempt_count, 2);

        state.begin_retry();
        state.record_failure(&p, t0);
        assert_eq!(state.attempt_count, 3);
        assert!(state.next_eligible_at.is_none());
        assert!(!p.is_eligible(state.attempt_count, t0, t0 + chrono::Duration::days(365)));

        state.reset();
        assert_eq!(state.attempt_count, 0);
    }

    #[test]
    fn test_defaults_from_config() {
        let p = RetryPolicy::default();
        assert_eq!(p.initial_delay, hours(2));
        assert_eq!(p.max_delay, hours(24));
        assert_eq!(p.max_attempts, 3);
        assert!((p.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }
}
