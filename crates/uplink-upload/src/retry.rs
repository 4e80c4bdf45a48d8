//! Attempt budget and backoff.
//!
//! One policy object answers both questions the scheduler asks after a
//! failed attempt: may this item try again, and how long should it wait.

use std::time::Duration;

use uplink_core::{UploadError, UploadManagerConfig};

/// What to do with an item after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then return to `Pending`.
    Retry {
        /// Backoff before the next attempt.
        delay: Duration,
    },
    /// Give up; the item becomes `Failed`.
    Fail,
    /// The caller cancelled; the item is parked without spending an attempt.
    Pause,
}

/// Retry policy with capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Default attempt budget for new items.
    pub max_attempts: u32,
    /// Delay multiplied by `2^attempt`.
    pub base_delay: Duration,
    /// Cap applied to every delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&UploadManagerConfig::default())
    }
}

impl RetryPolicy {
    /// Build the policy from manager configuration.
    #[must_use]
    pub const fn from_config(config: &UploadManagerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }

    /// Whether another attempt is allowed after `attempt_count` failures.
    #[must_use]
    pub const fn should_retry(attempt_count: u32, max_attempts: u32) -> bool {
        attempt_count < max_attempts
    }

    /// Delay before the next attempt, `attempt_count` failures in.
    ///
    /// `min(max_delay, base_delay * 2^attempt_count)`; overflow saturates to
    /// `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt_count: u32) -> Duration {
        2u32.checked_pow(attempt_count)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Classify a failure given the item's updated attempt count.
    #[must_use]
    pub fn decide(&self, error: &UploadError, attempt_count: u32, max_attempts: u32) -> RetryDecision {
        if error.is_cancelled() {
            return RetryDecision::Pause;
        }
        if error.is_retryable() && Self::should_retry(attempt_count, max_attempts) {
            RetryDecision::Retry {
                delay: self.backoff_delay(attempt_count),
            }
        } else {
            RetryDecision::Fail
        }
    }
}
