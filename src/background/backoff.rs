use std::time::Duration;

/// Multiplicative backoff clamped to `[min_delay, max_delay]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    factor: f64,
}

impl ExponentialBackoff {
    pub const DEFAULT_FACTOR: f64 = 1.2;

    pub fn new(min_delay: Duration, max_delay: Duration, factor: f64) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
            factor,
        }
    }

    /// Delay that follows `previous`; a zero `previous` yields the minimum.
    pub fn next_delay(&self, previous: Duration) -> Duration {
        let next_ms = (previous.as_millis() as f64 * self.factor).round() as u64;
        let min_ms = self.min_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        Duration::from_millis(next_ms.clamp(min_ms, max_ms))
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_by_factor_and_caps() {
        let backoff = ExponentialBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(15),
            ExponentialBackoff::DEFAULT_FACTOR,
        );

        let first = backoff.next_delay(Duration::ZERO);
        let second = backoff.next_delay(first);
        let third = backoff.next_delay(second);
        let fourth = backoff.next_delay(third);

        assert_eq!(first, Duration::from_millis(10));
        assert_eq!(second, Duration::from_millis(12));
        assert_eq!(third, Duration::from_millis(14));
        assert_eq!(fourth, Duration::from_millis(15));
    }
}
