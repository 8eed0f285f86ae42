//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before retry number `attempt` (1-based).
///
/// Doubles from `base` per attempt, caps at `max`, then adds up to 10%
/// random jitter. Attempt 0 never waits.
pub fn backoff_with_jitter(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;

    let factor = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(2);

        assert_eq!(backoff_with_jitter(0, base, max), Duration::ZERO);

        let b1 = backoff_with_jitter(1, base, max);
        assert!(b1 >= Duration::from_millis(100) && b1 < Duration::from_millis(110));

        let b2 = backoff_with_jitter(2, base, max);
        assert!(b2 >= Duration::from_millis(200));

        let capped = backoff_with_jitter(10, base, Duration::from_secs(1));
        assert!(capped >= Duration::from_secs(1) && capped < Duration::from_millis(1100));
    }

    #[test]
    fn test_backoff_large_attempt_saturates() {
        let delay = backoff_with_jitter(u32::MAX, Duration::from_secs(3), Duration::from_secs(10));
        assert!(delay >= Duration::from_secs(10));
    }
}
