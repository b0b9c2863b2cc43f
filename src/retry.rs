use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Retry policy for outbound service calls
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// Single attempt, no waiting
    Never,
    /// Exponential backoff with configuration
    ExponentialBackoff(RetryConfig),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::ExponentialBackoff(RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5000,
            backoff_base: 2.0,
            jitter_factor: 0.2,
        })
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::Never => 1,
            Self::ExponentialBackoff(cfg) => cfg.max_attempts.max(1),
        }
    }

    /// Delay before the attempt following `attempt` (1-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Never => Duration::ZERO,
            Self::ExponentialBackoff(cfg) => {
                let exp = cfg.backoff_base.powi(attempt.saturating_sub(1) as i32);
                let ms = (cfg.initial_delay_ms as f64 * exp).min(cfg.max_delay_ms as f64);
                Duration::from_millis(ms as u64)
            }
        }
    }

    /// Jittered delay, capped at the configured maximum
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Never => Duration::ZERO,
            Self::ExponentialBackoff(cfg) => {
                let base = self.base_delay(attempt);
                let jitter = if cfg.jitter_factor > 0.0 {
                    rand::thread_rng().gen_range(1.0 - cfg.jitter_factor..=1.0 + cfg.jitter_factor)
                } else {
                    1.0
                };
                let ms = (base.as_millis() as f64 * jitter).min(cfg.max_delay_ms as f64);
                Duration::from_millis(ms as u64)
            }
        }
    }
}
