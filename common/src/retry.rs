// Delay strategies between HTTP job attempts
//
// The number of attempts is bounded by the job's maxTrial; a strategy only
// decides how long to wait before the next one.

use crate::config::{RetryConfig, RetryStrategyKind};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Retry strategy trait for calculating delays between attempts
pub trait RetryStrategy: Send + Sync {
    /// Delay to wait after the failed attempt number `trial` (1-based)
    fn next_delay(&self, trial: u32) -> Duration;
}

/// Re-attempt immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl RetryStrategy for NoDelay {
    fn next_delay(&self, _trial: u32) -> Duration {
        Duration::ZERO
    }
}

/// Same delay before every re-attempt
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, _trial: u32) -> Duration {
        self.delay
    }
}

/// Exponential backoff retry strategy with jitter
/// Sequence: base, 2*base, 4*base, ... capped at max_delay
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay_millis: u64,
    max_delay_millis: u64,
    /// Jitter factor (0.0 to 1.0)
    jitter_factor: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_millis: 500,
            max_delay_millis: 30_000,
            jitter_factor: 0.1,
        }
    }
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(base_delay_millis: u64, max_delay_millis: u64, jitter_factor: f64) -> Self {
        Self {
            base_delay_millis,
            max_delay_millis,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Exponential delay without jitter
    fn calculate_base_delay(&self, trial: u32) -> u64 {
        let exponent = trial.saturating_sub(1).min(63);
        self.base_delay_millis
            .saturating_mul(1_u64 << exponent)
            .min(self.max_delay_millis)
    }

    fn add_jitter(&self, base_delay_millis: u64) -> u64 {
        let jitter_range = (base_delay_millis as f64 * self.jitter_factor) as u64;
        if jitter_range == 0 {
            return base_delay_millis;
        }
        base_delay_millis + rand::thread_rng().gen_range(0..=jitter_range)
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, trial: u32) -> Duration {
        Duration::from_millis(self.add_jitter(self.calculate_base_delay(trial)))
    }
}

/// Build the strategy selected in configuration
pub fn from_config(config: &RetryConfig) -> Arc<dyn RetryStrategy> {
    match config.strategy {
        RetryStrategyKind::None => Arc::new(NoDelay),
        RetryStrategyKind::Fixed => Arc::new(FixedDelay::new(Duration::from_millis(
            config.base_delay_millis,
        ))),
        RetryStrategyKind::Exponential => Arc::new(ExponentialBackoff::with_config(
            config.base_delay_millis,
            config.max_delay_millis,
            config.jitter_factor,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_delay() {
        assert_eq!(NoDelay.next_delay(1), Duration::ZERO);
        assert_eq!(NoDelay.next_delay(42), Duration::ZERO);
    }

    #[test]
    fn test_fixed_delay_strategy() {
        let delay = Duration::from_millis(750);
        let strategy = FixedDelay::new(delay);
        for trial in 1..5 {
            assert_eq!(strategy.next_delay(trial), delay);
        }
    }

    #[test]
    fn test_exponential_backoff_sequence() {
        let strategy = ExponentialBackoff::with_config(100, 1_000, 0.0);

        assert_eq!(strategy.calculate_base_delay(1), 100);
        assert_eq!(strategy.calculate_base_delay(2), 200);
        assert_eq!(strategy.calculate_base_delay(3), 400);
        assert_eq!(strategy.calculate_base_delay(4), 800);
        // capped
        assert_eq!(strategy.calculate_base_delay(5), 1_000);
        assert_eq!(strategy.calculate_base_delay(u32::MAX), 1_000);
    }

    #[test]
    fn test_jitter_stays_within_range() {
        let strategy = ExponentialBackoff::with_config(1_000, 60_000, 0.1);
        for _ in 0..50 {
            let delay = strategy.next_delay(1).as_millis();
            assert!(
                (1_000..=1_100).contains(&delay),
                "Delay {}ms should be between 1000ms and 1100ms",
                delay
            );
        }
    }

    #[test]
    fn test_jitter_factor_clamping() {
        let strategy1 = ExponentialBackoff::with_config(5, 1800, -0.5);
        assert_eq!(strategy1.jitter_factor, 0.0);

        let strategy2 = ExponentialBackoff::with_config(5, 1800, 1.5);
        assert_eq!(strategy2.jitter_factor, 1.0);
    }

    #[test]
    fn test_from_config_selects_strategy() {
        let mut config = RetryConfig {
            strategy: RetryStrategyKind::None,
            base_delay_millis: 250,
            max_delay_millis: 1_000,
            jitter_factor: 0.0,
        };
        assert_eq!(from_config(&config).next_delay(3), Duration::ZERO);

        config.strategy = RetryStrategyKind::Fixed;
        assert_eq!(from_config(&config).next_delay(3), Duration::from_millis(250));

        config.strategy = RetryStrategyKind::Exponential;
        assert_eq!(from_config(&config).next_delay(3), Duration::from_millis(1_000));
    }
}
