//! Retry backoff with jitter
//!
//! Delays grow as `initial × multiplier^attempt`, capped at `max_delay`.
//! With jitter enabled the delay keeps half of its base and randomizes the
//! rest, so many resources retrying at once do not hit the backend in
//! lockstep.

use rand::Rng;
use std::time::Duration;

/// Backoff parameters applied between retries of a transient failure.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap on any single delay.
    pub max_delay: Duration,

    /// Multiplicative growth factor per attempt.
    pub multiplier: f64,

    /// Whether to randomize delays (equal jitter).
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay for the given retry attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let base_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exp);
        let max_ms = self.max_delay.as_millis() as f64;

        let capped = if !base_ms.is_finite() || base_ms < 0.0 || base_ms > max_ms {
            self.max_delay
        } else {
            Duration::from_millis(base_ms as u64)
        };

        if !self.jitter {
            return capped;
        }

        let half = capped / 2;
        let extra_ms = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
        half + Duration::from_millis(extra_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_calculation() {
        let policy = BackoffPolicy {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10000),
            multiplier: 2.0,
            jitter: false,
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(8000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(10000)); // capped at max
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = BackoffPolicy {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        };

        for attempt in 0..6 {
            let base = BackoffPolicy {
                jitter: false,
                ..policy
            }
            .delay_for_attempt(attempt);
            for _ in 0..50 {
                let d = policy.delay_for_attempt(attempt);
                assert!(d >= base / 2, "attempt {}: {:?} below half of base", attempt, d);
                assert!(d <= base, "attempt {}: {:?} above base", attempt, d);
            }
        }
    }

    #[test]
    fn test_overflow_clamps_to_max() {
        let policy = BackoffPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 10.0,
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(1000), Duration::from_secs(30));
    }
}
