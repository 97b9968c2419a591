use rand::Rng;
use std::time::Duration;

/// Supplies the wait between retry attempts. `attempt` is 1-based: the value
/// returned for attempt `k` is the pause taken after the k-th failure.
pub trait BackoffStrategy: Send + Sync {
    fn next_backoff(&self, attempt: u32) -> Duration;
}

#[derive(Debug, Clone)]
pub struct ConstantBackoff {
    pub interval: Duration,
}

impl BackoffStrategy for ConstantBackoff {
    fn next_backoff(&self, _attempt: u32) -> Duration {
        self.interval
    }
}

/// Exponential growth capped at `max_interval`, with uniform jitter added on
/// top of the capped value: `d = min(M, I * m^(k-1))`, then `d + U(0, j*d)`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(60),
            multiplier: 1.5,
            jitter_factor: 0.2,
        }
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn next_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let raw = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent as i32);
        let capped = raw.min(self.max_interval.as_secs_f64());

        let jitter = if self.jitter_factor > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.jitter_factor * capped)
        } else {
            0.0
        };

        Duration::from_secs_f64(capped + jitter)
    }
}

#[derive(Debug, Clone)]
pub struct LinearBackoff {
    pub initial_interval: Duration,
    pub step: Duration,
    pub max_interval: Duration,
}

impl BackoffStrategy for LinearBackoff {
    fn next_backoff(&self, attempt: u32) -> Duration {
        let backoff = self.initial_interval + self.step * attempt.saturating_sub(1);
        backoff.min(self.max_interval)
    }
}

#[cfg(test)]
mod backoff_tests {
    use super::*;

    #[test]
    fn exponential_delays_stay_within_jitter_bounds() {
        let strategy = ExponentialBackoff::default();

        for attempt in 1..=10u32 {
            let base = (0.5 * 1.5f64.powi(attempt as i32 - 1)).min(60.0);
            let delay = strategy.next_backoff(attempt).as_secs_f64();
            assert!(
                delay >= base && delay <= base * 1.2 + f64::EPSILON,
                "attempt {attempt}: delay {delay} outside [{base}, {}]",
                base * 1.2
            );
        }
    }

    #[test]
    fn exponential_without_jitter_is_deterministic_and_capped() {
        let strategy = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(120),
            multiplier: 2.0,
            jitter_factor: 0.0,
        };

        assert_eq!(strategy.next_backoff(1), Duration::from_secs(1));
        assert_eq!(strategy.next_backoff(2), Duration::from_secs(2));
        assert_eq!(strategy.next_backoff(5), Duration::from_secs(16));
        assert_eq!(strategy.next_backoff(20), Duration::from_secs(120));
    }

    #[test]
    fn constant_ignores_the_attempt_number() {
        let strategy = ConstantBackoff {
            interval: Duration::from_millis(250),
        };
        assert_eq!(strategy.next_backoff(1), Duration::from_millis(250));
        assert_eq!(strategy.next_backoff(9), Duration::from_millis(250));
    }

    #[test]
    fn linear_grows_by_step_until_the_cap() {
        let strategy = LinearBackoff {
            initial_interval: Duration::from_millis(100),
            step: Duration::from_millis(200),
            max_interval: Duration::from_millis(500),
        };
        assert_eq!(strategy.next_backoff(1), Duration::from_millis(100));
        assert_eq!(strategy.next_backoff(2), Duration::from_millis(300));
        assert_eq!(strategy.next_backoff(3), Duration::from_millis(500));
        assert_eq!(strategy.next_backoff(4), Duration::from_millis(500));
    }
}
