//! Ticket reservation workload
//!
//! Each iteration is one user buying a seat: issue a queue token, wait for
//! admission, pick a date and a seat, reserve it (reselecting on conflicts)
//! and pay.

pub mod api;
pub mod error;
pub mod metrics;
pub mod responses;
pub mod scenario;

pub use api::{ReservationApi, ReserveOutcome};
pub use error::ReservationError;
pub use metrics::ReservationMetrics;
pub use responses::{IssuedToken, PaymentReceipt, QueueStatus, ResourceId, Seat};
pub use scenario::{ReservationScenario, ReservationState};
