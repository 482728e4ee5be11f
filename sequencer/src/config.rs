//! Engine configuration
//!
//! All knobs are passed in at construction; the engine holds no ambient
//! global state.

use chrono::Duration;

/// Backoff schedule for transient delivery failures
///
/// Defaults (5 minute base, doubling, 24 hour cap, 5 attempts) follow the
/// product defaults rather than a provider contract.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::minutes(5),
            max_delay: Duration::hours(24),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, given how many retryable failures the
    /// touch has accumulated (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        let delay = self.base_delay * (1i32 << exponent);
        std::cmp::min(delay, self.max_delay)
    }

    /// Whether a touch with this many retryable failures has exhausted its
    /// retry budget
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// Configuration for the sequencer engine
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    /// Upper bound on a single dispatch attempt; a timeout counts as a
    /// transient failure
    pub dispatch_timeout: std::time::Duration,
    /// Maximum enrollments evaluated per tick
    pub tick_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            dispatch_timeout: std::time::Duration::from_secs(30),
            tick_batch_size: 100,
        }
    }
}

impl EngineConfig {
    /// How far the claim pushes `next_fire_at` forward before dispatching.
    /// Long enough to outlive the dispatch timeout, so a crashed evaluation
    /// is retried once the claim expires.
    pub fn claim_window(&self) -> Duration {
        Duration::seconds(self.dispatch_timeout.as_secs() as i64 + 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_starts_at_base_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::minutes(5));
    }

    #[test]
    fn test_backoff_grows_strictly_until_cap() {
        let policy = RetryPolicy::default();
        let mut previous = Duration::zero();
        for attempt in 1..=9 {
            let delay = policy.delay_for_attempt(attempt);
            assert!(
                delay > previous || delay == policy.max_delay,
                "attempt {attempt} delay {delay} did not grow"
            );
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
    }

    #[test]
    fn test_backoff_caps_at_max_delay() {
        let policy = RetryPolicy {
            base_delay: Duration::minutes(5),
            max_delay: Duration::minutes(30),
            max_attempts: 10,
        };
        assert_eq!(policy.delay_for_attempt(3), Duration::minutes(20));
        assert_eq!(policy.delay_for_attempt(4), Duration::minutes(30));
        assert_eq!(policy.delay_for_attempt(9), Duration::minutes(30));
    }

    #[test]
    fn test_retry_budget_exhaustion() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
    }
}
