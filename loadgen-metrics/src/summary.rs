//! Aggregated statistics over recorded samples

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::registry::MetricKind;

/// Value at percentile `p` of an ascending slice.
///
/// Uses the nearest-rank index `floor(n * p / 100)`, clamped to the last
/// element, so `p(100)` is the maximum.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let index = ((sorted.len() as f64 * p / 100.0).floor() as usize).min(sorted.len() - 1);
    Some(sorted[index])
}

/// Summary of a trend metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    /// Samples counted but not retained for percentiles
    pub dropped_samples: u64,
    pub is_time: bool,
    #[serde(skip)]
    sorted: Vec<f64>,
}

impl TrendSummary {
    pub(crate) fn from_parts(
        count: u64,
        sum: f64,
        min: f64,
        max: f64,
        dropped_samples: u64,
        is_time: bool,
        mut retained: Vec<f64>,
    ) -> Self {
        retained.sort_by(f64::total_cmp);
        let at = |p: f64| percentile(&retained, p).unwrap_or(0.0);

        Self {
            count,
            min,
            max,
            avg: if count > 0 { sum / count as f64 } else { 0.0 },
            med: at(50.0),
            p90: at(90.0),
            p95: at(95.0),
            p99: at(99.0),
            dropped_samples,
            is_time,
            sorted: retained,
        }
    }

    /// Build a summary straight from samples
    pub fn from_samples(samples: impl IntoIterator<Item = f64>, is_time: bool) -> Self {
        let retained: Vec<f64> = samples.into_iter().collect();
        let count = retained.len() as u64;
        let sum: f64 = retained.iter().sum();
        let min = retained.iter().copied().reduce(f64::min).unwrap_or(0.0);
        let max = retained.iter().copied().reduce(f64::max).unwrap_or(0.0);
        Self::from_parts(count, sum, min, max, 0, is_time, retained)
    }

    /// Arbitrary percentile over the retained samples
    pub fn percentile(&self, p: f64) -> Option<f64> {
        percentile(&self.sorted, p)
    }
}

/// Summary of a rate metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateSummary {
    pub total: u64,
    pub passes: u64,
    pub fails: u64,
    pub rate: f64,
}

impl RateSummary {
    pub fn new(passes: u64, total: u64) -> Self {
        Self {
            total,
            passes,
            fails: total.saturating_sub(passes),
            rate: if total > 0 {
                passes as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// Summary of a counter metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CounterSummary {
    pub count: u64,
    /// Per second over the run so far
    pub rate: f64,
}

impl CounterSummary {
    pub fn new(count: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        Self {
            count,
            rate: if secs > 0.0 { count as f64 / secs } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricSummary {
    Trend(TrendSummary),
    Rate(RateSummary),
    Counter(CounterSummary),
}

impl MetricSummary {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSummary::Trend(_) => MetricKind::Trend,
            MetricSummary::Rate(_) => MetricKind::Rate,
            MetricSummary::Counter(_) => MetricKind::Counter,
        }
    }

    /// Whether anything was recorded
    pub fn has_data(&self) -> bool {
        match self {
            MetricSummary::Trend(trend) => trend.count > 0,
            MetricSummary::Rate(rate) => rate.total > 0,
            MetricSummary::Counter(counter) => counter.count > 0,
        }
    }
}

/// Snapshot of every metric in a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub metrics: BTreeMap<String, MetricSummary>,
}

impl RunSummary {
    pub fn get(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }

    pub fn trend(&self, name: &str) -> Option<&TrendSummary> {
        match self.metrics.get(name) {
            Some(MetricSummary::Trend(trend)) => Some(trend),
            _ => None,
        }
    }

    pub fn rate(&self, name: &str) -> Option<&RateSummary> {
        match self.metrics.get(name) {
            Some(MetricSummary::Rate(rate)) => Some(rate),
            _ => None,
        }
    }

    pub fn counter(&self, name: &str) -> Option<&CounterSummary> {
        match self.metrics.get(name) {
            Some(MetricSummary::Counter(counter)) => Some(counter),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_uses_nearest_rank() {
        let sorted: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 0.0), Some(1.0));
        assert_eq!(percentile(&sorted, 50.0), Some(6.0));
        assert_eq!(percentile(&sorted, 95.0), Some(10.0));
        assert_eq!(percentile(&sorted, 100.0), Some(10.0));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn trend_summary_statistics() {
        let summary = TrendSummary::from_samples((1..=100).map(f64::from), true);

        assert_eq!(summary.count, 100);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 100.0);
        assert_eq!(summary.avg, 50.5);
        assert_eq!(summary.med, 51.0);
        assert_eq!(summary.p90, 91.0);
        assert_eq!(summary.p95, 96.0);
        assert_eq!(summary.p99, 100.0);
        assert_eq!(summary.percentile(75.0), Some(76.0));
    }

    #[test]
    fn empty_trend_summary_is_zeroed() {
        let summary = TrendSummary::from_samples(std::iter::empty(), false);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.avg, 0.0);
        assert_eq!(summary.percentile(95.0), None);
        assert!(!MetricSummary::Trend(summary).has_data());
    }

    #[test]
    fn rate_summary_counts_fails() {
        let summary = RateSummary::new(3, 4);
        assert_eq!(summary.fails, 1);
        assert_eq!(summary.rate, 0.75);
        assert_eq!(RateSummary::new(0, 0).rate, 0.0);
    }

    #[test]
    fn counter_rate_is_per_second() {
        let summary = CounterSummary::new(50, Duration::from_secs(10));
        assert_eq!(summary.rate, 5.0);
    }

    #[test]
    fn run_summary_serializes_with_kind_tags() {
        let mut metrics = BTreeMap::new();
        metrics.insert(
            "reservation_success".to_string(),
            MetricSummary::Rate(RateSummary::new(1, 1)),
        );
        let summary = RunSummary {
            elapsed: Duration::from_secs(2),
            metrics,
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["elapsed"], "2s");
        assert_eq!(json["metrics"]["reservation_success"]["type"], "rate");
        assert_eq!(json["metrics"]["reservation_success"]["rate"], 1.0);
    }
}
