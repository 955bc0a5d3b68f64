//! Bounded connect retry with exponential backoff.
//!
//! A connect runs at most `max_attempts` attempts. Between attempts the
//! caller sleeps for [`RetryState::current_delay`], which grows by
//! `multiplier` after every failure, capped at `max_delay`.

use std::time::Duration;

/// Retry policy for `ConnectionManager::connect`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure (typically 2.0).
    pub multiplier: f64,
}

/// Default attempt budget for a connect.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// No delay between attempts. Handy for tests and for transports that
    /// already wait internally.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }
}

/// Progress through one retry sequence.
#[derive(Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    current_delay: Duration,
    attempts: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            current_delay: policy.initial_delay,
            policy,
            attempts: 0,
        }
    }

    /// Count an attempt about to be made. Returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Whether another attempt is allowed after the current one failed.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.policy.max_attempts.max(1)
    }

    /// Record a failed attempt and return the delay to wait before the next.
    pub fn record_failure(&mut self) -> Duration {
        let delay = self.current_delay;
        let next = self.current_delay.as_secs_f64() * self.policy.multiplier;
        self.current_delay = Duration::from_secs_f64(next).min(self.policy.max_delay);
        delay
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay that the next [`record_failure`](Self::record_failure) will return.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.multiplier, 2.0);
    }

    #[test]
    fn three_attempts_then_exhausted() {
        let mut state = RetryState::new(RetryPolicy::default());
        assert_eq!(state.begin_attempt(), 1);
        assert!(state.can_retry());
        assert_eq!(state.begin_attempt(), 2);
        assert!(state.can_retry());
        assert_eq!(state.begin_attempt(), 3);
        assert!(!state.can_retry());
        assert_eq!(state.attempts(), 3);
    }

    #[test]
    fn zero_attempts_still_allows_one() {
        let mut state = RetryState::new(RetryPolicy::immediate(0));
        state.begin_attempt();
        assert!(!state.can_retry());
    }

    #[test]
    fn backoff_progresses_on_failure() {
        let mut state = RetryState::new(RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        });
        assert_eq!(state.record_failure(), Duration::from_millis(100));
        assert_eq!(state.record_failure(), Duration::from_millis(200));
        assert_eq!(state.record_failure(), Duration::from_millis(400));
        assert_eq!(state.current_delay(), Duration::from_millis(800));
    }

    #[test]
    fn backoff_capped_at_max() {
        let mut state = RetryState::new(RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
        });
        state.record_failure(); // 1s → 2s
        state.record_failure(); // 2s → 4s
        state.record_failure(); // 4s → 4s (capped)
        assert_eq!(state.current_delay(), Duration::from_secs(4));
    }

    #[test]
    fn immediate_policy_never_waits() {
        let mut state = RetryState::new(RetryPolicy::immediate(3));
        assert_eq!(state.record_failure(), Duration::ZERO);
        assert_eq!(state.record_failure(), Duration::ZERO);
    }
}
