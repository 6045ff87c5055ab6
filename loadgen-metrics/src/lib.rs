//! Metric aggregation for loadgen
//!
//! A [`MetricsRegistry`] is shared by every iteration of a run. Iterations
//! record into cheap cloneable handles ([`Trend`], [`Rate`], [`Counter`]);
//! at any point the registry can produce a [`RunSummary`], against which a
//! [`ThresholdSet`] is evaluated.

pub mod error;
pub mod registry;
pub mod summary;
pub mod threshold;

pub use error::{MetricsError, ThresholdError};
pub use registry::{Counter, MetricKind, MetricsRegistry, Rate, Trend};
pub use summary::{CounterSummary, MetricSummary, RateSummary, RunSummary, TrendSummary};
pub use threshold::{
    Comparison, Statistic, Threshold, ThresholdReport, ThresholdResult, ThresholdSet, ThresholdStatus,
};
