//! Backoff strategies for retry policies

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest multiplicative spread applied when jitter is on
const JITTER_SPREAD: f64 = 0.2;

/// How the delay grows between attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay every time
    Fixed,

    /// `initial_delay * attempt`
    Linear,

    /// `initial_delay * base^(attempt - 1)`
    Exponential { base: f64 },
}

/// Turns an attempt number into a delay, capped at `max_delay`
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    strategy: BackoffStrategy,
    initial_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl BackoffCalculator {
    pub fn new(strategy: BackoffStrategy, initial_delay: Duration, max_delay: Duration, jitter: bool) -> Self {
        Self {
            strategy,
            initial_delay,
            max_delay,
            jitter,
        }
    }

    /// Delay before retrying after `attempt` (1-indexed) failed
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    /// Like [`calculate_delay`](Self::calculate_delay) with a caller-supplied
    /// jitter source. Jitter never pushes the delay past `max_delay`.
    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let delay = self.unjittered(attempt).min(self.max_delay);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let factor = rng.gen_range(1.0 - JITTER_SPREAD..1.0 + JITTER_SPREAD);
        delay.mul_f64(factor).min(self.max_delay)
    }

    fn unjittered(&self, attempt: u32) -> Duration {
        match &self.strategy {
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Linear => self.initial_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential { .. } if attempt == 0 => Duration::ZERO,
            BackoffStrategy::Exponential { base } => {
                // Computed in f64 seconds so large exponents saturate at the
                // cap instead of overflowing a Duration
                let multiplier = base.powf(f64::from(attempt - 1));
                if self.initial_delay.as_secs_f64() * multiplier >= self.max_delay.as_secs_f64() {
                    self.max_delay
                } else {
                    self.initial_delay.mul_f64(multiplier)
                }
            }
        }
    }
}
