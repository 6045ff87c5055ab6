//! Metric and threshold errors

use crate::registry::MetricKind;
use thiserror::Error;

/// Errors raised while registering metrics
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("Metric '{name}' is already registered as a {existing}, not a {requested}")]
    KindMismatch {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },

    #[error("Trend '{name}' is already registered with is_time={is_time}")]
    UnitMismatch { name: String, is_time: bool },

    #[error("Invalid metric name '{0}'")]
    InvalidName(String),
}

/// Errors raised while parsing threshold expressions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("Invalid threshold '{expression}' on metric '{metric}': expected '<stat> <op> <number>'")]
    InvalidExpression { metric: String, expression: String },

    #[error("Invalid percentile {value} in threshold on metric '{metric}': must be within 0..=100")]
    InvalidPercentile { metric: String, value: f64 },
}
