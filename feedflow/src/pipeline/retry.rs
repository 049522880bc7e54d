//! Retry policy with bounded exponential backoff.
//!
//! A [`RetryPolicy`] is an immutable value attached to each step. The
//! attempt counters it is consulted with live in per-run [`RetryState`].

use crate::errors::{ErrorClass, TaskError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry behavior for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Failure classes that are eligible for retry.
    pub retry_on: Vec<ErrorClass>,
    /// Wait before the first retry.
    pub interval: Duration,
    /// Total invocations allowed, including the first.
    pub max_attempts: u32,
    /// Multiplier applied to the wait for each further retry.
    pub backoff_rate: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_on: vec![ErrorClass::Transient, ErrorClass::Timeout],
            interval: Duration::from_secs(10),
            max_attempts: 2,
            backoff_rate: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Sets the retryable failure classes.
    #[must_use]
    pub fn with_retry_on(mut self, classes: impl IntoIterator<Item = ErrorClass>) -> Self {
        self.retry_on = classes.into_iter().collect();
        self
    }

    /// Sets the base interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the maximum number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_rate(mut self, rate: f64) -> Self {
        self.backoff_rate = rate;
        self
    }

    /// Returns true if the error's class is covered by this policy.
    ///
    /// Permanent failures never match, whatever `retry_on` says.
    #[must_use]
    pub fn matches(&self, error: &TaskError) -> bool {
        let class = error.class();
        class != ErrorClass::Permanent && self.retry_on.contains(&class)
    }

    /// Returns true if a step that just failed its `attempt`-th invocation
    /// (1-based) with `error` should be invoked again.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &TaskError) -> bool {
        self.matches(error) && attempt < self.max_attempts
    }

    /// Wait before the retry that follows the `attempt`-th invocation:
    /// `interval * backoff_rate^(attempt - 1)`.
    #[must_use]
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.interval.as_secs_f64() * self.backoff_rate.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Decides what to do after a failed invocation.
    #[must_use]
    pub fn decide(&self, attempt: u32, error: &TaskError) -> RetryDecision {
        if !self.matches(error) {
            RetryDecision::NotRetryable
        } else if attempt >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.next_delay(attempt))
        }
    }

    /// Validates the policy.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `retry_on` names the
    /// permanent class, `max_attempts` is zero, or the backoff rate is below
    /// 1.0 or not finite.
    pub fn validate(&self) -> Result<(), String> {
        if self.retry_on.contains(&ErrorClass::Permanent) {
            return Err("permanent failures are never retried".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if !self.backoff_rate.is_finite() {
            return Err(format!("backoff_rate must be finite, got {}", self.backoff_rate));
        }
        if self.backoff_rate < 1.0 {
            return Err(format!("backoff_rate must be >= 1.0, got {}", self.backoff_rate));
        }
        Ok(())
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// The attempt budget is spent.
    GiveUp,
    /// The error's class is not covered by the policy.
    NotRetryable,
}

/// Per-run attempt counters, keyed by step name.
#[derive(Debug, Default)]
pub struct RetryState {
    attempts: IndexMap<String, u32>,
}

impl RetryState {
    /// Creates empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one invocation of `step` and returns its 1-based attempt number.
    pub fn record_attempt(&mut self, step: &str) -> u32 {
        let count = self.attempts.entry(step.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Returns the number of invocations recorded for `step`.
    #[must_use]
    pub fn attempts(&self, step: &str) -> u32 {
        self.attempts.get(step).copied().unwrap_or(0)
    }

    /// Consumes the state, returning the counters in first-invocation order.
    #[must_use]
    pub fn into_counts(self) -> IndexMap<String, u32> {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_permanent_never_retried_even_when_listed() {
        let policy = RetryPolicy::default()
            .with_retry_on([ErrorClass::Transient, ErrorClass::Permanent])
            .with_max_attempts(5);

        assert!(policy.validate().unwrap_err().contains("permanent"));
        assert!(!policy.matches(&TaskError::permanent("404")));
        assert!(!policy.should_retry(1, &TaskError::permanent("404")));
        assert_eq!(policy.decide(1, &TaskError::permanent("404")), RetryDecision::NotRetryable);
        assert!(policy.should_retry(1, &TaskError::transient("503")));
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retry_on, vec![ErrorClass::Transient, ErrorClass::Timeout]);
        assert_eq!(policy.interval, Duration::from_secs(10));
        assert_eq!(policy.max_attempts, 2);
        assert!((policy.backoff_rate - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_retry_policy_builder() {
        let policy = RetryPolicy::new()
            .with_retry_on([ErrorClass::Transient])
            .with_interval(Duration::from_millis(500))
            .with_max_attempts(5)
            .with_backoff_rate(3.0);

        assert_eq!(policy.retry_on, vec![ErrorClass::Transient]);
        assert_eq!(policy.interval, Duration::from_millis(500));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn test_next_delay_exponential() {
        let policy = RetryPolicy::new().with_interval(Duration::from_secs(10));

        assert_eq!(policy.next_delay(1), Duration::from_secs(10));
        assert_eq!(policy.next_delay(2), Duration::from_secs(20));
        assert_eq!(policy.next_delay(3), Duration::from_secs(40));
    }

    #[test]
    fn test_next_delay_constant_rate() {
        let policy = RetryPolicy::new()
            .with_interval(Duration::from_millis(100))
            .with_backoff_rate(1.0);

        assert_eq!(policy.next_delay(1), Duration::from_millis(100));
        assert_eq!(policy.next_delay(6), Duration::from_millis(100));
    }

    #[test]
    fn test_next_delay_saturates() {
        let policy = RetryPolicy::new().with_backoff_rate(10.0);
        assert_eq!(policy.next_delay(u32::MAX), Duration::MAX);
    }

    #[test]
    fn test_should_retry_matched_class_within_budget() {
        let policy = RetryPolicy::default();
        let err = TaskError::transient("503");

        assert!(policy.should_retry(1, &err));
        assert!(!policy.should_retry(2, &err));
    }

    #[test]
    fn test_should_retry_timeout_by_default() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1, &TaskError::timeout(Duration::from_secs(10))));
    }

    #[test]
    fn test_permanent_never_retried() {
        let policy = RetryPolicy::default().with_max_attempts(10);
        let err = TaskError::permanent("404");

        assert!(!policy.should_retry(1, &err));
        assert_eq!(policy.decide(1, &err), RetryDecision::NotRetryable);
    }

    #[test]
    fn test_decide() {
        let policy = RetryPolicy::default();
        let err = TaskError::transient("reset");

        assert_eq!(policy.decide(1, &err), RetryDecision::Retry(Duration::from_secs(10)));
        assert_eq!(policy.decide(2, &err), RetryDecision::GiveUp);
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::none().validate().is_ok());
        assert!(RetryPolicy::default().with_max_attempts(0).validate().is_err());
        assert!(RetryPolicy::default().with_backoff_rate(0.5).validate().is_err());
        assert!(RetryPolicy::default().with_backoff_rate(f64::NAN).validate().is_err());
        assert!(RetryPolicy::default().with_backoff_rate(f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_retry_state_counts_per_step() {
        let mut state = RetryState::new();

        assert_eq!(state.record_attempt("GetStrip"), 1);
        assert_eq!(state.record_attempt("GetStrip"), 2);
        assert_eq!(state.record_attempt("GenFeed"), 1);

        assert_eq!(state.attempts("GetStrip"), 2);
        assert_eq!(state.attempts("SendHeartbeat"), 0);

        let counts = state.into_counts();
        assert_eq!(counts.keys().collect::<Vec<_>>(), vec!["GetStrip", "GenFeed"]);
    }
}
