//! Retry backoff for authority calls
//!
//! The authority call is the only automatic retry in the pipeline;
//! everything else fails fast.

use std::time::Duration;

/// Retry settings for one signing gate
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total authority attempts per file
    pub attempts: u32,
    /// Base delay before the second attempt
    pub initial_delay: Duration,
    /// Cap on the computed delay
    pub max_delay: Duration,
    /// Exponential growth factor
    pub backoff_multiplier: f64,
    /// Random spread applied to each delay
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Policy with the configured attempt count and base delay
    #[must_use]
    pub fn new(attempts: u32, initial_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            initial_delay,
            ..Self::default()
        }
    }
}

/// Calculate exponential backoff delay with jitter
pub(crate) fn calculate_backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base_delay = {
        // Precision loss acceptable for backoff calculations
        #[allow(clippy::cast_precision_loss)]
        {
            policy.initial_delay.as_millis().min(u128::from(u64::MAX)) as f64
        }
    };
    let max_delay = {
        #[allow(clippy::cast_precision_loss)]
        {
            policy.max_delay.as_millis().min(u128::from(u64::MAX)) as f64
        }
    };

    let delay = base_delay
        * policy.backoff_multiplier.powi({
            // Attempt counts stay small
            #[allow(clippy::cast_possible_wrap)]
            {
                attempt as i32 - 1
            }
        });
    let delay = delay.min(max_delay);

    // Add jitter
    let jitter = delay * policy.jitter_factor * (rand::random::<f64>() - 0.5);
    let final_delay = {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            (delay + jitter).max(0.0).round() as u64
        }
    };

    Duration::from_millis(final_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_with_attempts() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        let first = calculate_backoff_delay(&policy, 1);
        let second = calculate_backoff_delay(&policy, 2);
        let third = calculate_backoff_delay(&policy, 3);
        assert_eq!(first, Duration::from_secs(1));
        assert_eq!(second, Duration::from_secs(2));
        assert_eq!(third, Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_respects_cap() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(3),
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        let late = calculate_backoff_delay(&policy, 10);
        assert_eq!(late, Duration::from_secs(3));
    }

    #[test]
    fn test_jitter_stays_near_base() {
        let policy = RetryPolicy::default();
        let delay = calculate_backoff_delay(&policy, 1);
        assert!(delay >= Duration::from_millis(900));
        assert!(delay <= Duration::from_millis(1100));
    }
}
