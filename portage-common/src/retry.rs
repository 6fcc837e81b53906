//! Retry timing policies
//!
//! A [`RetryPolicy`] is purely advisory timing: 1-based attempt number in,
//! wait duration out. Whether a given issue class is *eligible* for retry
//! is decided by the job from its per-kind toggles, not here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Wait-duration strategy between retry attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum RetryPolicy {
    /// `base * 2^(attempt - 1)`, saturating on overflow
    Exponential { base: Duration },
    /// The same wait for every attempt
    Fixed { wait: Duration },
}

impl RetryPolicy {
    /// Wait duration before the given 1-based attempt
    ///
    /// Attempt 0 is treated as attempt 1.
    pub fn wait_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            Self::Exponential { base } => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
            Self::Fixed { wait } => *wait,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_doubles_per_attempt() {
        let policy = RetryPolicy::Exponential {
            base: Duration::from_millis(100),
        };
        assert_eq!(policy.wait_for(1), Duration::from_millis(100));
        assert_eq!(policy.wait_for(2), Duration::from_millis(200));
        assert_eq!(policy.wait_for(3), Duration::from_millis(400));
        assert_eq!(policy.wait_for(4), Duration::from_millis(800));
    }

    #[test]
    fn test_exponential_saturates() {
        let policy = RetryPolicy::Exponential {
            base: Duration::from_secs(1),
        };
        // Shift past u32 range must not panic or wrap
        let wait = policy.wait_for(64);
        assert!(wait >= policy.wait_for(33));
    }

    #[test]
    fn test_fixed_is_constant() {
        let policy = RetryPolicy::Fixed {
            wait: Duration::from_secs(5),
        };
        assert_eq!(policy.wait_for(1), Duration::from_secs(5));
        assert_eq!(policy.wait_for(10), Duration::from_secs(5));
    }

    #[test]
    fn test_attempt_zero_clamps_to_one() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.wait_for(0), policy.wait_for(1));
    }
}
