//! Typed client for the reservation service

use loadgen_config::PaymentConfig;
use loadgen_engine::IterationError;
use loadgen_http::{HttpClient, HttpRequest, HttpResponse};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;

use crate::responses::{Envelope, IssuedToken, PaymentReceipt, QueueStatus, Reservation, ResourceId, Seat};

const QUEUE_TOKEN_HEADER: &str = "QUEUE-TOKEN";

/// Result of a reservation request
#[derive(Debug, Clone, PartialEq)]
pub enum ReserveOutcome {
    Reserved(ResourceId),
    /// The seat was taken by someone else first
    Conflict,
}

/// One method per endpoint. Every method maps transport failures, unexpected
/// statuses and malformed bodies onto [`IterationError`].
#[derive(Clone)]
pub struct ReservationApi {
    client: Arc<dyn HttpClient>,
    conflict_marker: String,
}

impl ReservationApi {
    pub fn new(client: Arc<dyn HttpClient>, conflict_marker: impl Into<String>) -> Self {
        Self {
            client,
            conflict_marker: conflict_marker.into(),
        }
    }

    pub async fn issue_token(&self, user_id: u64) -> Result<IssuedToken, IterationError> {
        const STEP: &str = "token";
        let request = HttpRequest::post("/tokens/issue").json(json!({ "userId": user_id }));
        let response = self.expect_success(STEP, request).await?;
        Ok(parse::<Envelope<IssuedToken>>(STEP, &response)?.data)
    }

    /// Current queue status, `None` while the service answers with a
    /// non-success status
    pub async fn token_status(&self, token_id: &ResourceId) -> Result<Option<QueueStatus>, IterationError> {
        const STEP: &str = "queue";
        let request = HttpRequest::get("/tokens/status").query("tokenId", token_id);
        let response = self.send(STEP, request).await?;
        if !response.is_success() {
            return Ok(None);
        }
        parse(STEP, &response).map(Some)
    }

    pub async fn available_dates(&self, concert_id: u64) -> Result<Vec<String>, IterationError> {
        const STEP: &str = "schedule";
        let request = HttpRequest::get(format!("/concerts/{}/dates/available", concert_id));
        let response = self.expect_success(STEP, request).await?;
        Ok(parse::<Envelope<Vec<String>>>(STEP, &response)?.data)
    }

    pub async fn available_seats(
        &self,
        concert_id: u64,
        schedule_date: &str,
        token: &str,
    ) -> Result<Vec<Seat>, IterationError> {
        const STEP: &str = "seats";
        let request = HttpRequest::get(format!("/concerts/{}/seats/available", concert_id))
            .query("scheduleDate", schedule_date)
            .header(QUEUE_TOKEN_HEADER, token);
        let response = self.expect_success(STEP, request).await?;
        Ok(parse::<Envelope<Vec<Seat>>>(STEP, &response)?.data)
    }

    pub async fn reserve_seat(
        &self,
        concert_id: u64,
        user_id: u64,
        schedule_date: &str,
        seat_id: u64,
        token: &str,
    ) -> Result<ReserveOutcome, IterationError> {
        const STEP: &str = "reserve";
        let request = HttpRequest::post(format!("/reservations/{}/reserve-seats", concert_id))
            .header(QUEUE_TOKEN_HEADER, token)
            .json(json!({
                "userId": user_id,
                "date": schedule_date,
                "seatId": seat_id,
                "seatNo": 1,
            }));

        let response = self.send(STEP, request).await?;
        if response.status == 400 && response.body_contains(&self.conflict_marker) {
            return Ok(ReserveOutcome::Conflict);
        }
        if response.status != 200 {
            return Err(status_error(STEP, response));
        }
        let reservation = parse::<Envelope<Reservation>>(STEP, &response)?.data;
        Ok(ReserveOutcome::Reserved(reservation.reservation_id))
    }

    pub async fn pay(
        &self,
        reservation_id: &ResourceId,
        user_id: u64,
        seat_id: u64,
        payment: &PaymentConfig,
        token: &str,
    ) -> Result<PaymentReceipt, IterationError> {
        const STEP: &str = "payment";
        let request = HttpRequest::post(format!("/reservations/{}/payment", reservation_id))
            .header(QUEUE_TOKEN_HEADER, token)
            .json(json!({
                "userId": user_id,
                "seatId": seat_id,
                "paymentInfo": {
                    "amount": payment.amount,
                    "method": payment.method,
                },
            }));
        let response = self.expect_success(STEP, request).await?;
        parse(STEP, &response)
    }

    async fn send(&self, step: &'static str, request: HttpRequest) -> Result<HttpResponse, IterationError> {
        self.client
            .send(request)
            .await
            .map_err(|source| IterationError::Transport { step, source })
    }

    async fn expect_success(
        &self,
        step: &'static str,
        request: HttpRequest,
    ) -> Result<HttpResponse, IterationError> {
        let response = self.send(step, request).await?;
        if response.status != 200 || response.body.is_empty() {
            return Err(status_error(step, response));
        }
        Ok(response)
    }
}

fn status_error(step: &'static str, response: HttpResponse) -> IterationError {
    IterationError::Status {
        step,
        status: response.status,
        body: response.body,
    }
}

fn parse<T: DeserializeOwned>(step: &'static str, response: &HttpResponse) -> Result<T, IterationError> {
    response.json().map_err(|e| IterationError::Parse {
        step,
        message: e.to_string(),
    })
}
