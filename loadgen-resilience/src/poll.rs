//! Bounded polling on top of the retry executor

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use crate::retry::{RetryError, RetryExecutor, RetryPolicy, Retryable};

/// How often to poll and for how long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(u32::MAX, self.interval).with_max_elapsed(self.max_wait)
    }
}

/// Result of a single check
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    Ready(T),
    Pending,
}

/// Result of the whole polling loop
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Ready { value: T, waited: Duration, polls: u32 },
    TimedOut { waited: Duration, polls: u32 },
}

impl<T> PollOutcome<T> {
    pub fn waited(&self) -> Duration {
        match self {
            PollOutcome::Ready { waited, .. } | PollOutcome::TimedOut { waited, .. } => *waited,
        }
    }

    pub fn polls(&self) -> u32 {
        match self {
            PollOutcome::Ready { polls, .. } | PollOutcome::TimedOut { polls, .. } => *polls,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            PollOutcome::Ready { value, .. } => Some(value),
            PollOutcome::TimedOut { .. } => None,
        }
    }
}

enum PollError<E> {
    Pending,
    /// The check was still running when the polling deadline passed
    Overrun { poll: u32 },
    Failed(E),
}

impl<E> fmt::Display for PollError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::Pending => write!(f, "condition not met yet"),
            PollError::Overrun { poll } => write!(f, "poll {} outlived the polling deadline", poll),
            PollError::Failed(_) => write!(f, "check failed"),
        }
    }
}

impl<E> Retryable for PollError<E> {
    fn is_retryable(&self) -> bool {
        matches!(self, PollError::Pending)
    }

    fn is_transient(&self) -> bool {
        true
    }
}

/// Call `check` every `policy.interval` until it reports [`PollStatus::Ready`]
/// or `policy.max_wait` has elapsed. The check receives the 1-indexed poll
/// number. A check error ends polling immediately.
///
/// The check is always called at least once. The whole loop, slow checks
/// included, returns within `max_wait + interval`; a check still running at
/// that point is dropped and the outcome is [`PollOutcome::TimedOut`].
pub async fn poll_until<F, Fut, T, E>(policy: PollPolicy, mut check: F) -> Result<PollOutcome<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, E>>,
{
    let started = Instant::now();
    let deadline = started + policy.max_wait + policy.interval;
    let executor = RetryExecutor::new(policy.retry_policy());

    let result = executor
        .execute_with_context(|poll| {
            let fut = check(poll);
            async move {
                match timeout_at(deadline, fut).await {
                    Ok(Ok(PollStatus::Ready(value))) => Ok((value, poll)),
                    Ok(Ok(PollStatus::Pending)) => Err(PollError::Pending),
                    Ok(Err(error)) => Err(PollError::Failed(error)),
                    Err(_) => Err(PollError::Overrun { poll }),
                }
            }
        })
        .await;

    let waited = started.elapsed();
    match result {
        Ok((value, polls)) => Ok(PollOutcome::Ready {
            value,
            waited,
            polls,
        }),
        Err(RetryError::NonRetryableError(PollError::Failed(error))) => Err(error),
        Err(RetryError::NonRetryableError(PollError::Overrun { poll })) => Ok(PollOutcome::TimedOut {
            waited,
            polls: poll,
        }),
        Err(RetryError::MaxAttemptsExceeded { attempts, .. })
        | Err(RetryError::DeadlineExceeded { attempts, .. }) => Ok(PollOutcome::TimedOut {
            waited,
            polls: attempts,
        }),
        // Pending is always retryable
        Err(RetryError::NonRetryableError(PollError::Pending)) => Ok(PollOutcome::TimedOut {
            waited,
            polls: 0,
        }),
    }
}
