//! Threshold expressions and their evaluation
//!
//! A threshold is `<stat> <op> <number>`, for example `p(95) < 2000` or
//! `rate < 0.01`, attached to a metric name.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ThresholdError;
use crate::summary::{MetricSummary, RunSummary};

static THRESHOLD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(avg|min|max|med|count|rate|p\(\s*(\d+(?:\.\d+)?)\s*\))\s*(<=|>=|==|!=|<|>)\s*(-?\d+(?:\.\d+)?)\s*$",
    )
    .expect("threshold pattern compiles")
});

/// Aggregated statistic a threshold inspects
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Statistic {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    Percentile(f64),
}

impl Statistic {
    /// Value of this statistic for `summary`, `None` when it does not apply
    /// to the metric's kind
    pub fn value_of(&self, summary: &MetricSummary) -> Option<f64> {
        match (summary, self) {
            (MetricSummary::Trend(trend), Statistic::Avg) => Some(trend.avg),
            (MetricSummary::Trend(trend), Statistic::Min) => Some(trend.min),
            (MetricSummary::Trend(trend), Statistic::Max) => Some(trend.max),
            (MetricSummary::Trend(trend), Statistic::Med) => Some(trend.med),
            (MetricSummary::Trend(trend), Statistic::Count) => Some(trend.count as f64),
            (MetricSummary::Trend(trend), Statistic::Percentile(p)) => trend.percentile(*p),
            (MetricSummary::Rate(rate), Statistic::Rate) => Some(rate.rate),
            (MetricSummary::Rate(rate), Statistic::Count) => Some(rate.total as f64),
            (MetricSummary::Counter(counter), Statistic::Count) => Some(counter.count as f64),
            (MetricSummary::Counter(counter), Statistic::Rate) => Some(counter.rate),
            _ => None,
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Avg => write!(f, "avg"),
            Statistic::Min => write!(f, "min"),
            Statistic::Max => write!(f, "max"),
            Statistic::Med => write!(f, "med"),
            Statistic::Count => write!(f, "count"),
            Statistic::Rate => write!(f, "rate"),
            Statistic::Percentile(p) => write!(f, "p({})", p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparison {
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
}

impl Comparison {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "<" => Some(Comparison::Less),
            "<=" => Some(Comparison::LessOrEqual),
            ">" => Some(Comparison::Greater),
            ">=" => Some(Comparison::GreaterOrEqual),
            "==" => Some(Comparison::Equal),
            "!=" => Some(Comparison::NotEqual),
            _ => None,
        }
    }

    pub fn holds(&self, observed: f64, limit: f64) -> bool {
        match self {
            Comparison::Less => observed < limit,
            Comparison::LessOrEqual => observed <= limit,
            Comparison::Greater => observed > limit,
            Comparison::GreaterOrEqual => observed >= limit,
            Comparison::Equal => observed == limit,
            Comparison::NotEqual => observed != limit,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
        };
        write!(f, "{}", op)
    }
}

/// One parsed threshold rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Threshold {
    pub metric: String,
    pub expression: String,
    pub statistic: Statistic,
    pub comparison: Comparison,
    pub limit: f64,
}

impl Threshold {
    pub fn parse(metric: &str, expression: &str) -> Result<Self, ThresholdError> {
        let invalid = || ThresholdError::InvalidExpression {
            metric: metric.to_string(),
            expression: expression.to_string(),
        };

        let captures = THRESHOLD_PATTERN.captures(expression).ok_or_else(invalid)?;

        let statistic = match (&captures[1], captures.get(2)) {
            (_, Some(p)) => {
                let value: f64 = p.as_str().parse().map_err(|_| invalid())?;
                if !(0.0..=100.0).contains(&value) {
                    return Err(ThresholdError::InvalidPercentile {
                        metric: metric.to_string(),
                        value,
                    });
                }
                Statistic::Percentile(value)
            }
            ("avg", None) => Statistic::Avg,
            ("min", None) => Statistic::Min,
            ("max", None) => Statistic::Max,
            ("med", None) => Statistic::Med,
            ("count", None) => Statistic::Count,
            ("rate", None) => Statistic::Rate,
            _ => return Err(invalid()),
        };
        let comparison = Comparison::parse(&captures[3]).ok_or_else(invalid)?;
        let limit: f64 = captures[4].parse().map_err(|_| invalid())?;

        Ok(Self {
            metric: metric.to_string(),
            expression: expression.trim().to_string(),
            statistic,
            comparison,
            limit,
        })
    }

    /// Evaluate against a run summary
    pub fn evaluate(&self, summary: &RunSummary) -> ThresholdResult {
        let (observed, status) = match summary.get(&self.metric) {
            None => (None, ThresholdStatus::NoData),
            Some(metric) if !metric.has_data() => (None, ThresholdStatus::NoData),
            Some(metric) => match self.statistic.value_of(metric) {
                None => (None, ThresholdStatus::NotApplicable),
                Some(value) if self.comparison.holds(value, self.limit) => {
                    (Some(value), ThresholdStatus::Passed)
                }
                Some(value) => (Some(value), ThresholdStatus::Failed),
            },
        };

        ThresholdResult {
            metric: self.metric.clone(),
            expression: self.expression.clone(),
            observed,
            status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdStatus {
    Passed,
    Failed,
    /// The metric recorded nothing; does not fail the run
    NoData,
    /// The statistic does not exist for the metric's kind; fails the run
    NotApplicable,
}

impl ThresholdStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, ThresholdStatus::Failed | ThresholdStatus::NotApplicable)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub status: ThresholdStatus,
}

/// Outcome of evaluating every threshold of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdReport {
    pub results: Vec<ThresholdResult>,
}

impl ThresholdReport {
    pub fn passed(&self) -> bool {
        !self.results.iter().any(|result| result.status.is_failure())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.results.iter().filter(|result| result.status.is_failure())
    }
}

/// All thresholds of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdSet {
    thresholds: Vec<Threshold>,
}

impl ThresholdSet {
    /// Parse a metric name -> expressions map
    pub fn parse(config: &BTreeMap<String, Vec<String>>) -> Result<Self, ThresholdError> {
        let thresholds = config
            .iter()
            .flat_map(|(metric, expressions)| {
                expressions
                    .iter()
                    .map(move |expression| Threshold::parse(metric, expression))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { thresholds })
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Threshold> {
        self.thresholds.iter()
    }

    pub fn evaluate(&self, summary: &RunSummary) -> ThresholdReport {
        ThresholdReport {
            results: self
                .thresholds
                .iter()
                .map(|threshold| threshold.evaluate(summary))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MetricsRegistry;

    fn thresholds(entries: Vec<(&str, Vec<&str>)>) -> ThresholdSet {
        let config = entries
            .into_iter()
            .map(|(metric, exprs)| {
                (
                    metric.to_string(),
                    exprs.iter().map(|e| e.to_string()).collect(),
                )
            })
            .collect();
        ThresholdSet::parse(&config).unwrap()
    }

    #[test]
    fn parses_supported_expressions() {
        let threshold = Threshold::parse("http_req_duration", "p(95) < 2000").unwrap();
        assert_eq!(threshold.statistic, Statistic::Percentile(95.0));
        assert_eq!(threshold.comparison, Comparison::Less);
        assert_eq!(threshold.limit, 2000.0);

        let threshold = Threshold::parse("http_req_failed", "rate<=0.01").unwrap();
        assert_eq!(threshold.statistic, Statistic::Rate);
        assert_eq!(threshold.comparison, Comparison::LessOrEqual);

        let threshold = Threshold::parse("iterations", " count >= 10 ").unwrap();
        assert_eq!(threshold.statistic, Statistic::Count);
        assert_eq!(threshold.expression, "count >= 10");

        let threshold = Threshold::parse("x", "p(99.9) != -1.5").unwrap();
        assert_eq!(threshold.statistic, Statistic::Percentile(99.9));
        assert_eq!(threshold.limit, -1.5);
    }

    #[test]
    fn rejects_malformed_expressions() {
        for expression in ["p95 < 10", "avg 10", "rate << 1", "mean < 2", "", "p() < 1"] {
            assert!(
                matches!(
                    Threshold::parse("m", expression),
                    Err(ThresholdError::InvalidExpression { .. })
                ),
                "accepted {:?}",
                expression
            );
        }
        assert!(matches!(
            Threshold::parse("m", "p(101) < 1"),
            Err(ThresholdError::InvalidPercentile { .. })
        ));
    }

    #[test]
    fn p95_fails_on_slow_tail() {
        let registry = MetricsRegistry::new();
        let duration = registry.time_trend("http_req_duration").unwrap();
        // 95 samples spread over 100..200ms, 5 at 3000ms
        for i in 0..95 {
            duration.add(100.0 + (i as f64) * 100.0 / 94.0);
        }
        for _ in 0..5 {
            duration.add(3000.0);
        }

        let report = thresholds(vec![("http_req_duration", vec!["p(95)<500", "p(90)<500", "med<200"])])
            .evaluate(&registry.summary());

        assert!(!report.passed());
        assert_eq!(report.results[0].status, ThresholdStatus::Failed);
        assert_eq!(report.results[0].observed, Some(3000.0));
        assert_eq!(report.results[1].status, ThresholdStatus::Passed);
        assert_eq!(report.results[2].status, ThresholdStatus::Passed);
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn p95_passes_without_tail() {
        let registry = MetricsRegistry::new();
        let duration = registry.time_trend("http_req_duration").unwrap();
        for i in 0..100 {
            duration.add(100.0 + i as f64);
        }

        let report = thresholds(vec![("http_req_duration", vec!["p(95)<500"])]).evaluate(&registry.summary());
        assert!(report.passed());
    }

    #[test]
    fn rate_threshold() {
        let registry = MetricsRegistry::new();
        let failed = registry.rate("http_req_failed").unwrap();
        for i in 0..200 {
            failed.add(i < 3);
        }

        let summary = registry.summary();
        assert!(thresholds(vec![("http_req_failed", vec!["rate<0.02"])]).evaluate(&summary).passed());
        assert!(!thresholds(vec![("http_req_failed", vec!["rate<0.01"])]).evaluate(&summary).passed());
    }

    #[test]
    fn missing_data_does_not_fail() {
        let registry = MetricsRegistry::new();
        registry.rate("reservation_success").unwrap();

        let report = thresholds(vec![
            ("reservation_success", vec!["rate>0.9"]),
            ("never_registered", vec!["count>0"]),
        ])
        .evaluate(&registry.summary());

        assert!(report.passed());
        assert!(report
            .results
            .iter()
            .all(|result| result.status == ThresholdStatus::NoData));
    }

    #[test]
    fn inapplicable_statistic_fails() {
        let registry = MetricsRegistry::new();
        registry.counter("iterations").unwrap().add(5);

        let report = thresholds(vec![("iterations", vec!["p(95)<1"])]).evaluate(&registry.summary());
        assert!(!report.passed());
        assert_eq!(report.results[0].status, ThresholdStatus::NotApplicable);
    }
}
