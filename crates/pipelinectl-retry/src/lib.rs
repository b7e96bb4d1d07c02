//! Per-stage retry policies and exponential-backoff-with-jitter delay
//! calculation for the Deployment Orchestrator (§4.10) and the timeout
//! handling shared with the Pipeline Monitor (§5).
//!
//! # Example
//!
//! ```
//! use pipelinectl_retry::{RetryPolicy, calculate_delay};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::for_stage_default(2);
//! let delay = calculate_delay(&policy, 1);
//! assert_eq!(delay, Duration::from_secs(2));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A stage's retry budget (§4.10 "Retry policy"). `max_attempts` is the
/// number of *retries* beyond the first attempt; validate/backup default
/// to 0 (no retry), apply/verify default to 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Jitter factor (0.0 = none, 1.0 = full jitter: delay * [0, 2]).
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(1),
            jitter: 0.0,
        }
    }

    pub fn for_stage_default(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            jitter: 0.3,
        }
    }
}

/// Exponential backoff with jitter: `base * 2^(attempt-1)`, capped at
/// `max_delay`, then jittered by `factor in [1-jitter, 1+jitter]`.
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let pow = attempt.saturating_sub(1).min(16);
    let raw = policy.base_delay.saturating_mul(2_u32.saturating_pow(pow));
    let capped = raw.min(policy.max_delay);
    if policy.jitter > 0.0 {
        apply_jitter(capped, policy.jitter)
    } else {
        capped
    }
}

fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let random_value: f64 = rng.r#gen();
    let factor = 1.0 - jitter + (random_value * 2.0 * jitter);
    let millis = (delay.as_millis() as f64 * factor).round().max(0.0) as u64;
    Duration::from_millis(millis)
}

/// Decide whether a stage should re-attempt, given the error's own
/// retriability and how many attempts have already been made.
pub fn should_retry(policy: &RetryPolicy, error_is_retriable: bool, attempts_made: u32) -> bool {
    error_is_retriable && attempts_made <= policy.max_attempts
}

/// Wall-clock timeout per stage (§5). Distinct from the retry policy: a
/// stage may be retried, but each individual attempt is itself bounded by
/// this deadline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StageTimeout {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_without_jitter() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
        };
        assert_eq!(calculate_delay(&policy, 1), Duration::from_secs(1));
        assert_eq!(calculate_delay(&policy, 2), Duration::from_secs(2));
        assert_eq!(calculate_delay(&policy, 3), Duration::from_secs(4));
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter: 0.0,
        };
        assert_eq!(calculate_delay(&policy, 10), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(100),
            jitter: 0.5,
        };
        for attempt in 1..=3 {
            let d = calculate_delay(&policy, attempt);
            let base = policy.base_delay.saturating_mul(2_u32.pow(attempt - 1)).min(policy.max_delay);
            let lower = base.mul_f64(0.5);
            let upper = base.mul_f64(1.5);
            assert!(d >= lower && d <= upper, "delay {:?} out of [{:?}, {:?}]", d, lower, upper);
        }
    }

    #[test]
    fn validate_and_backup_default_to_zero_retries() {
        let validate = RetryPolicy::none();
        assert!(!should_retry(&validate, true, 1));
    }

    #[test]
    fn non_retriable_error_never_retries_regardless_of_budget() {
        let policy = RetryPolicy::for_stage_default(2);
        assert!(!should_retry(&policy, false, 0));
    }

    #[test]
    fn retriable_error_retries_until_budget_exhausted() {
        let policy = RetryPolicy::for_stage_default(2);
        assert!(should_retry(&policy, true, 0));
        assert!(should_retry(&policy, true, 1));
        assert!(should_retry(&policy, true, 2));
        assert!(!should_retry(&policy, true, 3));
    }
}
