use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    FixedDelay,
    LinearBackoff,
    ExponentialBackoff,
}

/// Delay schedule between send attempts of a single flush cycle.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: RetryStrategy,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            strategy: RetryStrategy::FixedDelay,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            ..Default::default()
        }
    }

    pub fn exponential(base_delay: Duration) -> Self {
        Self {
            base_delay,
            strategy: RetryStrategy::ExponentialBackoff,
            jitter: true,
            ..Default::default()
        }
    }

    /// Delay before the next attempt, given the number of failures so far
    /// (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = match self.strategy {
            RetryStrategy::FixedDelay => self.base_delay,
            RetryStrategy::LinearBackoff => {
                Duration::from_millis(self.base_delay.as_millis() as u64 * attempt as u64)
            }
            RetryStrategy::ExponentialBackoff => {
                let multiplier = 2_u64.saturating_pow(attempt.saturating_sub(1));
                Duration::from_millis(
                    (self.base_delay.as_millis() as u64).saturating_mul(multiplier),
                )
            }
        };

        let capped = std::cmp::min(base, self.max_delay);

        if self.jitter {
            apply_jitter(capped)
        } else {
            capped
        }
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    let mut rng = rand::rng();
    let factor = rng.random_range(0.5..1.5);
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}
