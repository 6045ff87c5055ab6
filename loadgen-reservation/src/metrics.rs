//! Workload metrics

use loadgen_metrics::{MetricsError, MetricsRegistry, Rate, Trend};

/// Per-step timings and the reservation outcome
#[derive(Debug, Clone)]
pub struct ReservationMetrics {
    pub token_time: Trend,
    pub queue_wait_time: Trend,
    pub schedule_time: Trend,
    /// Initial seat lookup only; reselections belong to the reserve step
    pub seat_time: Trend,
    /// One sample per reservation request
    pub reserve_time: Trend,
    pub payment_time: Trend,
    /// Recorded once by every iteration that reaches the reserve step
    pub reservation_success: Rate,
}

impl ReservationMetrics {
    pub fn register(registry: &MetricsRegistry) -> Result<Self, MetricsError> {
        Ok(Self {
            token_time: registry.time_trend("token_time")?,
            queue_wait_time: registry.time_trend("queue_wait_time")?,
            schedule_time: registry.time_trend("schedule_time")?,
            seat_time: registry.time_trend("seat_time")?,
            reserve_time: registry.time_trend("reserve_time")?,
            payment_time: registry.time_trend("payment_time")?,
            reservation_success: registry.rate("reservation_success")?,
        })
    }
}
