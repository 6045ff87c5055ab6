//! Engine error types

use loadgen_http::HttpError;
use loadgen_metrics::MetricsError;
use std::time::Duration;
use thiserror::Error;

/// Why an iteration ended early
#[derive(Error, Debug)]
pub enum IterationError {
    /// Endpoint unreachable or the request could not be sent
    #[error("{step}: request failed: {source}")]
    Transport {
        step: &'static str,
        #[source]
        source: HttpError,
    },

    /// Unexpected response status
    #[error("{step}: unexpected status {status}: {body}")]
    Status {
        step: &'static str,
        status: u16,
        body: String,
    },

    /// Response body not in the expected shape
    #[error("{step}: malformed response: {message}")]
    Parse { step: &'static str, message: String },

    /// Every attempt hit a transient conflict
    #[error("{step}: still conflicting after {attempts} attempts")]
    ConflictExhausted { step: &'static str, attempts: u32 },

    /// No acceptable candidate was found
    #[error("{step}: no candidate available after {attempts} lookups")]
    SelectionExhausted { step: &'static str, attempts: u32 },

    /// A bounded wait ran out
    #[error("{step}: gave up waiting after {waited:?}")]
    Timeout { step: &'static str, waited: Duration },
}

impl IterationError {
    /// Timeouts end the iteration as incomplete rather than failed
    pub fn is_timeout(&self) -> bool {
        matches!(self, IterationError::Timeout { .. })
    }

    pub fn is_failure(&self) -> bool {
        !self.is_timeout()
    }

    /// Step the error was raised in
    pub fn step(&self) -> &'static str {
        match self {
            IterationError::Transport { step, .. }
            | IterationError::Status { step, .. }
            | IterationError::Parse { step, .. }
            | IterationError::ConflictExhausted { step, .. }
            | IterationError::SelectionExhausted { step, .. }
            | IterationError::Timeout { step, .. } => step,
        }
    }
}

/// Fixture store errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FixtureError {
    #[error("Fixture pool '{0}' is not defined")]
    NotFound(String),

    #[error("Fixture pool '{0}' holds values of a different type")]
    TypeMismatch(String),

    #[error("Fixture pool '{0}' is empty")]
    Empty(String),

    #[error("Failed to load fixture pool '{name}': {message}")]
    Load { name: String, message: String },
}

/// Scheduler errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid arrival plan: {0}")]
    InvalidPlan(String),

    #[error(transparent)]
    Metrics(#[from] MetricsError),
}
