//! Resilience patterns for loadgen
//!
//! Retry policies with pluggable backoff, a retry budget for hand-written
//! loops, and a bounded polling loop built on the same retry machinery.

pub mod backoff;
pub mod poll;
pub mod retry;

pub use backoff::{BackoffCalculator, BackoffStrategy};
pub use poll::{poll_until, PollOutcome, PollPolicy, PollStatus};
pub use retry::{RetryBudget, RetryError, RetryExecutor, RetryPolicy, Retryable};
