//! Metrics aggregation and reporting configuration

use crate::error::ConfigResult;
use crate::validation::{validate_duration, validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Interval between live progress snapshots; absent disables them
    #[serde(with = "humantime_serde")]
    pub report_interval: Option<Duration>,

    /// Upper bound on samples retained per trend for percentile queries.
    /// Samples past the bound still count towards count/sum/min/max.
    pub max_samples_per_metric: Option<usize>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval: Some(Duration::from_secs(5)),
            max_samples_per_metric: None,
        }
    }
}

impl Validatable for MetricsConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(interval) = self.report_interval {
            validate_duration(interval, "report_interval", self.domain_name())?;
        }
        if let Some(bound) = self.max_samples_per_metric {
            validate_positive(bound, "max_samples_per_metric", self.domain_name())?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "metrics"
    }
}
