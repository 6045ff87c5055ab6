//! Retry policy and executor

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::backoff::{BackoffCalculator, BackoffStrategy};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,

    /// Initial delay between retries
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Backoff strategy
    pub backoff_strategy: BackoffStrategy,

    /// Whether to add jitter to retry delays
    pub jitter: bool,

    /// Stop retrying once this much time has passed since the first attempt
    #[serde(with = "humantime_serde", default)]
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_strategy: BackoffStrategy::Exponential { base: 2.0 },
            jitter: true,
            max_elapsed: None,
        }
    }
}

impl RetryPolicy {
    /// Same delay before every retry, no jitter
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_strategy: BackoffStrategy::Fixed,
            jitter: false,
            max_elapsed: None,
        }
    }

    /// Bound the total time spent retrying
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    /// Calculate delay for a specific attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        BackoffCalculator::new(
            self.backoff_strategy.clone(),
            self.initial_delay,
            self.max_delay,
            self.jitter,
        )
        .calculate_delay(attempt)
    }

    /// Start tracking attempts against this policy
    pub fn budget(&self) -> RetryBudget {
        RetryBudget {
            policy: self.clone(),
            attempt: 1,
            started: Instant::now(),
        }
    }
}

/// Attempt bookkeeping for one retried operation.
///
/// Useful when the retried step has to touch caller state between attempts,
/// which the closure-based [`RetryExecutor`] cannot lend out.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    policy: RetryPolicy,
    attempt: u32,
    started: Instant,
}

impl RetryBudget {
    /// The attempt currently in progress (1-indexed)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Time since the budget was created
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the elapsed-time bound has been reached
    pub fn deadline_reached(&self) -> bool {
        self.policy
            .max_elapsed
            .is_some_and(|max| self.started.elapsed() >= max)
    }

    /// Record that the current attempt failed.
    ///
    /// Returns the delay to wait before the next attempt, or `None` once
    /// either the attempt or the elapsed-time bound is used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts || self.deadline_reached() {
            return None;
        }
        let delay = self.policy.delay_for_attempt(self.attempt);
        self.attempt += 1;
        Some(delay)
    }
}

/// Trait for errors that can be retried
pub trait Retryable {
    /// Whether this error is retryable
    fn is_retryable(&self) -> bool;

    /// Expected, short-lived condition; retries are logged quietly
    fn is_transient(&self) -> bool {
        false
    }

    /// Custom retry delay for this error type
    fn retry_delay(&self) -> Option<Duration> {
        None
    }
}

/// Retry executor
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Execute a function with retry logic
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        self.execute_with_context(|_attempt| f()).await
    }

    /// Execute a function with retry logic and attempt context
    pub async fn execute_with_context<F, Fut, T, E>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        let mut budget = self.policy.budget();

        loop {
            let attempt = budget.attempt();
            debug!("Executing attempt {} of {}", attempt, self.policy.max_attempts);

            let error = match f(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("Operation succeeded after {} attempts", attempt);
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                warn!("Operation failed with non-retryable error: {}", error);
                return Err(RetryError::NonRetryableError(error));
            }

            let Some(backoff) = budget.next_delay() else {
                if budget.deadline_reached() {
                    debug!("Retry deadline reached after {} attempts: {}", attempt, error);
                    return Err(RetryError::DeadlineExceeded {
                        attempts: attempt,
                        elapsed: budget.elapsed(),
                        last_error: error,
                    });
                }
                warn!("Operation failed after {} attempts: {}", attempt, error);
                return Err(RetryError::MaxAttemptsExceeded {
                    attempts: attempt,
                    last_error: error,
                });
            };

            let delay = error.retry_delay().unwrap_or(backoff);
            if error.is_transient() {
                debug!("Attempt {} not done yet: {}. Retrying in {:?}", attempt, error, delay);
            } else {
                warn!("Attempt {} failed: {}. Retrying in {:?}", attempt, error, delay);
            }
            sleep(delay).await;
        }
    }
}

/// Retry error types
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts ({attempts}) exceeded. Last error: {last_error}")]
    MaxAttemptsExceeded { attempts: u32, last_error: E },

    /// Elapsed-time bound reached
    #[error("Gave up after {attempts} attempts in {elapsed:?}. Last error: {last_error}")]
    DeadlineExceeded {
        attempts: u32,
        elapsed: Duration,
        last_error: E,
    },

    /// Non-retryable error encountered
    #[error("Non-retryable error: {0}")]
    NonRetryableError(E),
}
