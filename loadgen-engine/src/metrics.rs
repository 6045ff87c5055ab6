//! Built-in engine metrics

use loadgen_metrics::{Counter, MetricsError, MetricsRegistry, Rate, Trend};

/// Handles to the metrics every run records regardless of workload
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    pub http_reqs: Counter,
    pub http_req_duration: Trend,
    pub http_req_failed: Rate,
    pub iterations: Counter,
    pub iteration_duration: Trend,
    pub iteration_errors: Rate,
    pub iterations_timed_out: Counter,
    pub iterations_interrupted: Counter,
    pub iterations_incomplete: Counter,
    pub dropped_iterations: Counter,
}

impl EngineMetrics {
    pub fn register(registry: &MetricsRegistry) -> Result<Self, MetricsError> {
        Ok(Self {
            http_reqs: registry.counter("http_reqs")?,
            http_req_duration: registry.time_trend("http_req_duration")?,
            http_req_failed: registry.rate("http_req_failed")?,
            iterations: registry.counter("iterations")?,
            iteration_duration: registry.time_trend("iteration_duration")?,
            iteration_errors: registry.rate("iteration_errors")?,
            iterations_timed_out: registry.counter("iterations_timed_out")?,
            iterations_interrupted: registry.counter("iterations_interrupted")?,
            iterations_incomplete: registry.counter("iterations_incomplete")?,
            dropped_iterations: registry.counter("dropped_iterations")?,
        })
    }
}
