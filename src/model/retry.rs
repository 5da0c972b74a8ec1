use std::time::Duration;

use rand::Rng;

use super::ModelCallError;

const RETRY_BASE_DELAY_MS: u64 = 1_000;
const RETRY_MAX_DELAY_SECS: u64 = 30;

/// Backoff policy for transient model-call failures.
///
/// Delays grow exponentially (1s, 2s, 4s, ...) up to a cap, with a small
/// random jitter so concurrent actors do not retry in lockstep. A provider-
/// specified retry delay (rate-limit responses) takes precedence over the
/// computed backoff, still subject to the cap.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Additional attempts after the first call.
    pub max_retries: u32,
    /// First backoff delay.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_secs(RETRY_MAX_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether another attempt should be made for `error` after `attempt`
    /// failures.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &ModelCallError) -> bool {
        attempt < self.max_retries && error.is_transient()
    }

    /// Delay before the retry following attempt number `attempt` (0-based).
    ///
    /// Honors a provider-advertised delay when the failure carries one.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &ModelCallError) -> Duration {
        if let ModelCallError::RateLimited {
            retry_after_ms: Some(ms),
        } = error
        {
            return Duration::from_millis(*ms).min(self.max_delay);
        }
        self.exponential_backoff(attempt)
    }

    /// Exponential backoff with up to 10% additive jitter, capped.
    fn exponential_backoff(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
        let cap_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let capped = delay_ms.min(cap_ms);
        let jitter = rand::rng().random_range(0..=capped / 10);
        Duration::from_millis((capped + jitter).min(cap_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retried_within_budget() {
        let policy = RetryPolicy::default();
        let err = ModelCallError::Server {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(policy.should_retry(0, &err));
        assert!(policy.should_retry(2, &err));
        assert!(!policy.should_retry(3, &err));
    }

    #[test]
    fn permanent_errors_are_never_retried() {
        let policy = RetryPolicy::default();
        let err = ModelCallError::Auth("bad key".into());
        assert!(!policy.should_retry(0, &err));
    }

    #[test]
    fn retry_after_takes_precedence_over_backoff() {
        let policy = RetryPolicy::default();
        let err = ModelCallError::RateLimited {
            retry_after_ms: Some(2_500),
        };
        assert_eq!(policy.delay_for(0, &err), Duration::from_millis(2_500));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();
        let err = ModelCallError::Connection("reset".into());
        let delay = policy.delay_for(20, &err);
        assert!(delay <= policy.max_delay, "expected capped delay, got {delay:?}");
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
        };
        let err = ModelCallError::Timeout { elapsed_ms: 10 };
        let d0 = policy.delay_for(0, &err);
        let d3 = policy.delay_for(3, &err);
        assert!(d0 >= Duration::from_millis(100));
        assert!(d3 >= Duration::from_millis(800));
    }
}
