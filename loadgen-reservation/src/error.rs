//! Workload setup errors

use loadgen_engine::FixtureError;
use loadgen_http::HttpError;
use loadgen_metrics::MetricsError;
use thiserror::Error;

/// Errors raised while assembling the workload
#[derive(Error, Debug)]
pub enum ReservationError {
    #[error("Fixture error: {0}")]
    Fixture(#[from] FixtureError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("HTTP client error: {0}")]
    Http(#[from] HttpError),
}
