//! Exponential backoff with jitter

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::config::BackoffConfig;

#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
    rng: StdRng,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempt: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic jitter for tests
    pub fn with_seed(config: BackoffConfig, seed: u64) -> Self {
        Self {
            config,
            attempt: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Consecutive failures since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay before the next retry.
    ///
    /// `initial * multiplier^attempt`, jittered, never above `max_ms`. A
    /// server-supplied hint raises the delay but is still capped.
    pub fn next_delay(&mut self, hint: Option<Duration>) -> Duration {
        let max = self.config.max_ms as f64;
        let exponent = self.attempt.min(64) as i32;
        let base = (self.config.initial_ms as f64 * self.config.multiplier.powi(exponent)).min(max);

        let jitter = self.config.jitter;
        let factor = if jitter > 0.0 {
            1.0 + self.rng.gen_range(-jitter..=jitter)
        } else {
            1.0
        };
        let mut millis = (base * factor).clamp(0.0, max);

        if let Some(hint) = hint {
            millis = millis.max(hint.as_millis() as f64).min(max);
        }

        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(millis.round() as u64)
    }
}
