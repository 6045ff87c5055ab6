//! Ticket reservation workload configuration

use crate::error::ConfigResult;
use crate::validation::{validate_duration, validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of the reservation workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationConfig {
    /// Fixture pool user ids are drawn from
    pub user_pool: String,

    /// Fixture pool concert ids are drawn from
    pub concert_pool: String,

    /// Interval between queue status polls
    #[serde(with = "humantime_serde")]
    pub queue_poll_interval: Duration,

    /// Longest time to wait for queue admission
    #[serde(with = "humantime_serde")]
    pub queue_max_wait: Duration,

    /// Seat list fetches per selection before giving up
    pub seat_lookup_attempts: u32,

    /// Pause between seat list fetches that yielded no usable seat
    #[serde(with = "humantime_serde")]
    pub seat_lookup_delay: Duration,

    /// Reservation attempts shared by conflict and reselection paths
    pub max_seat_attempts: u32,

    /// Pause after an "already reserved" conflict
    #[serde(with = "humantime_serde")]
    pub seat_retry_delay: Duration,

    /// Pause after a successful reservation before paying
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,

    /// Pause at the end of an iteration
    #[serde(with = "humantime_serde")]
    pub think_time: Duration,

    /// Body marker identifying a seat conflict on a 400 response
    pub conflict_marker: String,

    pub payment: PaymentConfig,
}

/// Payment request details
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    pub amount: u64,
    pub method: String,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            user_pool: "users".to_string(),
            concert_pool: "concerts".to_string(),
            queue_poll_interval: Duration::from_secs(2),
            queue_max_wait: Duration::from_secs(30),
            seat_lookup_attempts: 5,
            seat_lookup_delay: Duration::from_secs(1),
            max_seat_attempts: 5,
            seat_retry_delay: Duration::from_secs(1),
            settle_delay: Duration::from_secs(3),
            think_time: Duration::from_secs(1),
            conflict_marker: "SEAT_ALREADY_RESERVED".to_string(),
            payment: PaymentConfig::default(),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            amount: 50_000,
            method: "CREDIT_CARD".to_string(),
        }
    }
}

impl Validatable for ReservationConfig {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();
        validate_required_string(&self.user_pool, "user_pool", domain)?;
        validate_required_string(&self.concert_pool, "concert_pool", domain)?;
        validate_duration(self.queue_poll_interval, "queue_poll_interval", domain)?;
        validate_positive(self.seat_lookup_attempts, "seat_lookup_attempts", domain)?;
        validate_positive(self.max_seat_attempts, "max_seat_attempts", domain)?;
        validate_required_string(&self.conflict_marker, "conflict_marker", domain)?;
        validate_positive(self.payment.amount, "payment.amount", domain)?;
        validate_required_string(&self.payment.method, "payment.method", domain)?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "reservation"
    }
}
