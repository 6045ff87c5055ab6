//! Typed response bodies of the reservation service

use serde::Deserialize;
use std::fmt;

/// Identifier the service may send as a number or a string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum ResourceId {
    Number(u64),
    Text(String),
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Number(id) => write!(f, "{}", id),
            ResourceId::Text(id) => write!(f, "{}", id),
        }
    }
}

/// `{ data: T }` wrapper used by most endpoints
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

/// `POST /tokens/issue`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub id: ResourceId,
    pub token: String,
    #[serde(default)]
    pub queue_position: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub has_passed_queue: bool,
}

/// `GET /tokens/status`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueueStatus {
    pub status: String,
}

impl QueueStatus {
    pub fn is_active(&self) -> bool {
        self.status == "ACTIVE"
    }
}

/// Element of `GET /concerts/{id}/seats/available`; other fields are ignored
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Seat {
    pub id: u64,
}

/// `POST /reservations/{id}/reserve-seats`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Reservation {
    pub reservation_id: ResourceId,
}

/// `POST /reservations/{id}/payment`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    #[serde(default)]
    pub remaining_balance: Option<f64>,
}
