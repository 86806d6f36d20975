//! Backoff schedules for the retry loop and the reconnect scheduler.
//!
//! The two paths are deliberately asymmetric and must stay that way:
//! call retries grow exponentially with no cap and no jitter, while
//! reconnect delays add up to one second of jitter and cap at a maximum.

use rand::Rng;
use std::time::Duration;

/// Upper bound of the uniform jitter added to reconnect delays.
pub const RECONNECT_JITTER_MS: u64 = 1_000;

/// Per-call retry backoff: `base * 2^attempt`, uncapped.
#[derive(Debug, Clone, Copy)]
pub struct RetryBackoff {
    base: Duration,
}

impl RetryBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    /// Delay to sleep after the failure of `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        self.base.checked_mul(multiplier).unwrap_or(Duration::from_secs(u64::MAX))
    }
}

/// Reconnect backoff: `min(initial * 2^attempts + U(0, 1s), max)`.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay before reconnect attempt number `attempts` (0-indexed).
    pub fn delay(&self, attempts: u32) -> Duration {
        self.delay_with_rng(attempts, &mut rand::rng())
    }

    /// Same as [`ReconnectBackoff::delay`] with a caller-supplied RNG, for
    /// deterministic tests.
    pub fn delay_with_rng<R: Rng>(&self, attempts: u32, rng: &mut R) -> Duration {
        let multiplier = 2u32.saturating_pow(attempts);
        let exp = self.initial.checked_mul(multiplier).unwrap_or(Duration::from_secs(u64::MAX));
        let jitter = Duration::from_millis(rng.random_range(0..=RECONNECT_JITTER_MS));
        exp.checked_add(jitter).unwrap_or(Duration::from_secs(u64::MAX)).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn retry_backoff_doubles_per_attempt() {
        let backoff = RetryBackoff::new(Duration::from_millis(1_000));
        assert_eq!(backoff.delay(0), Duration::from_millis(1_000));
        assert_eq!(backoff.delay(1), Duration::from_millis(2_000));
        assert_eq!(backoff.delay(2), Duration::from_millis(4_000));
        assert_eq!(backoff.delay(3), Duration::from_millis(8_000));
    }

    #[test]
    fn retry_backoff_has_no_cap() {
        let backoff = RetryBackoff::new(Duration::from_millis(1_000));
        // 1000ms * 2^20 is over 17 minutes; nothing clamps it.
        assert_eq!(backoff.delay(20), Duration::from_millis(1_000 * (1 << 20)));
    }

    #[test]
    fn retry_backoff_saturates_instead_of_overflowing() {
        let backoff = RetryBackoff::new(Duration::from_secs(u64::MAX / 2));
        let delay = backoff.delay(40);
        assert!(delay >= Duration::from_secs(u64::MAX / 2));
    }

    #[test]
    fn reconnect_delay_stays_in_jitter_window() {
        let backoff =
            ReconnectBackoff::new(Duration::from_millis(1_000), Duration::from_millis(30_000));
        for _ in 0..100 {
            let delay = backoff.delay(0);
            assert!(delay >= Duration::from_millis(1_000));
            assert!(delay <= Duration::from_millis(1_000 + RECONNECT_JITTER_MS));
        }
    }

    #[test]
    fn reconnect_delay_caps_at_max() {
        let backoff =
            ReconnectBackoff::new(Duration::from_millis(1_000), Duration::from_millis(30_000));
        let mut rng = StdRng::seed_from_u64(7);
        // 1000 * 2^10 is already past the cap regardless of jitter.
        assert_eq!(backoff.delay_with_rng(10, &mut rng), Duration::from_millis(30_000));
    }

    #[test]
    fn reconnect_delay_is_deterministic_with_seeded_rng() {
        let backoff =
            ReconnectBackoff::new(Duration::from_millis(1_000), Duration::from_millis(30_000));
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        assert_eq!(backoff.delay_with_rng(2, &mut a), backoff.delay_with_rng(2, &mut b));
    }
}
