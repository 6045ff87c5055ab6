//! The reservation workflow

use async_trait::async_trait;
use loadgen_config::{LoadConfig, ReservationConfig};
use loadgen_engine::{
    acquire_with_exclusion, timed, EngineMetrics, FixturePool, FixtureStore, InstrumentedClient,
    IterationContext, IterationError, SelectionError, Workload,
};
use loadgen_http::HttpManager;
use loadgen_metrics::MetricsRegistry;
use loadgen_resilience::{poll_until, PollOutcome, PollPolicy, PollStatus, RetryPolicy};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{ReservationApi, ReserveOutcome};
use crate::error::ReservationError;
use crate::metrics::ReservationMetrics;
use crate::responses::{ResourceId, Seat};

/// What one iteration has acquired so far
#[derive(Debug, Default)]
pub struct ReservationState {
    pub user_id: Option<u64>,
    pub concert_id: Option<u64>,
    pub token: Option<String>,
    pub token_id: Option<ResourceId>,
    pub schedule_date: Option<String>,
    /// Seats that came back as already reserved
    pub excluded_seats: HashSet<u64>,
    pub seat_id: Option<u64>,
    /// Reservation requests sent
    pub reserve_attempts: u32,
    pub reservation_id: Option<ResourceId>,
    pub remaining_balance: Option<f64>,
}

/// Ticket reservation workload
pub struct ReservationScenario {
    name: String,
    api: ReservationApi,
    config: ReservationConfig,
    users: FixturePool<u64>,
    concerts: FixturePool<u64>,
    metrics: ReservationMetrics,
}

impl ReservationScenario {
    pub fn new(
        name: &str,
        api: ReservationApi,
        config: ReservationConfig,
        fixtures: &FixtureStore,
        registry: &MetricsRegistry,
    ) -> Result<Self, ReservationError> {
        Ok(Self {
            name: name.to_string(),
            users: fixtures.get(&config.user_pool)?,
            concerts: fixtures.get(&config.concert_pool)?,
            metrics: ReservationMetrics::register(registry)?,
            api,
            config,
        })
    }

    /// Wire the workload to the target service described by `config`,
    /// recording HTTP metrics into `registry`
    pub fn from_config(config: &LoadConfig, registry: &MetricsRegistry) -> Result<Self, ReservationError> {
        let builtin = EngineMetrics::register(registry)?;
        let manager = HttpManager::with_config(&config.target.base_url, config.http.clone().into())?;
        let client = InstrumentedClient::new(Arc::new(manager), &builtin);
        let api = ReservationApi::new(Arc::new(client), config.reservation.conflict_marker.clone());
        let fixtures = FixtureStore::from_config(&config.fixtures)?;

        Self::new(
            &config.scenario.name,
            api,
            config.reservation.clone(),
            &fixtures,
            registry,
        )
    }

    pub fn metrics(&self) -> &ReservationMetrics {
        &self.metrics
    }

    /// Poll until the token is admitted. Records the wait on success.
    async fn wait_for_admission(&self, token_id: &ResourceId) -> Result<(), IterationError> {
        let policy = PollPolicy::new(self.config.queue_poll_interval, self.config.queue_max_wait);
        let outcome = poll_until(policy, |poll| {
            let api = &self.api;
            async move {
                let status = api.token_status(token_id).await?;
                debug!(poll, status = ?status, "Queue status");
                Ok::<_, IterationError>(match status {
                    Some(status) if status.is_active() => PollStatus::Ready(()),
                    _ => PollStatus::Pending,
                })
            }
        })
        .await?;

        match outcome {
            PollOutcome::Ready { waited, polls, .. } => {
                self.metrics.queue_wait_time.add_duration(waited);
                info!(polls, "Admitted after {:?}", waited);
                Ok(())
            }
            PollOutcome::TimedOut { waited, .. } => Err(IterationError::Timeout { step: "queue", waited }),
        }
    }

    /// Fetch available seats and pick one that is not excluded. Running out
    /// of lookups while nothing is free is a bounded wait on seat
    /// availability, so it ends as a timeout.
    async fn select_seat(
        &self,
        concert_id: u64,
        schedule_date: &str,
        token: &str,
        excluded: &HashSet<u64>,
        rng: &mut StdRng,
    ) -> Result<u64, IterationError> {
        let started = Instant::now();
        let policy = RetryPolicy::fixed(self.config.seat_lookup_attempts, self.config.seat_lookup_delay);
        let seat = acquire_with_exclusion(&policy, excluded, |seat: &Seat| seat.id, rng, move || {
            self.api.available_seats(concert_id, schedule_date, token)
        })
        .await
        .map_err(|e| match e {
            SelectionError::Fetch(error) => error,
            SelectionError::Exhausted { attempts } => {
                debug!(attempts, "No seat free after lookups");
                IterationError::Timeout {
                    step: "seats",
                    waited: started.elapsed(),
                }
            }
        })?;
        Ok(seat.id)
    }

    /// Reserve a seat, excluding and reselecting on conflicts.
    ///
    /// Every reservation request and every reselection that finds no free
    /// seat is charged to one `max_seat_attempts` budget. After a conflict
    /// the next seat is chosen first, then `seat_retry_delay` is waited out.
    async fn reserve(
        &self,
        ctx: &mut IterationContext<ReservationState>,
        user_id: u64,
        concert_id: u64,
        schedule_date: &str,
        token: &str,
        initial_seat: u64,
    ) -> Result<ResourceId, IterationError> {
        let mut budget = RetryPolicy::fixed(self.config.max_seat_attempts, self.config.seat_retry_delay).budget();
        let mut seat_id = initial_seat;

        loop {
            ctx.state.seat_id = Some(seat_id);
            ctx.state.reserve_attempts += 1;

            let (outcome, _) = timed(
                &self.metrics.reserve_time,
                self.api.reserve_seat(concert_id, user_id, schedule_date, seat_id, token),
            )
            .await;

            match outcome? {
                ReserveOutcome::Reserved(reservation_id) => {
                    info!(seat_id, %reservation_id, "Seat reserved");
                    return Ok(reservation_id);
                }
                ReserveOutcome::Conflict => {
                    warn!(seat_id, "Seat already reserved, choosing another");
                    ctx.state.excluded_seats.insert(seat_id);
                }
            }

            let mut last_lookup = None;
            seat_id = loop {
                let Some(delay) = budget.next_delay() else {
                    return Err(last_lookup.unwrap_or(IterationError::ConflictExhausted {
                        step: "reserve",
                        attempts: budget.attempt(),
                    }));
                };
                let selected = {
                    let (state, rng) = ctx.state_and_rng();
                    self.select_seat(concert_id, schedule_date, token, &state.excluded_seats, rng)
                        .await
                };
                ctx.sleep(delay).await;
                match selected {
                    Ok(seat_id) => break seat_id,
                    Err(error) if error.is_timeout() => {
                        warn!(attempt = budget.attempt(), "No seat to reselect: {}", error);
                        last_lookup = Some(error);
                    }
                    Err(error) => return Err(error),
                }
            };
        }
    }
}

#[async_trait]
impl Workload for ReservationScenario {
    type State = ReservationState;

    fn name(&self) -> &str {
        &self.name
    }

    async fn iteration(&self, ctx: &mut IterationContext<ReservationState>) -> Result<(), IterationError> {
        let user_id = *self.users.random(ctx.rng()).ok_or(IterationError::SelectionExhausted {
            step: "fixtures",
            attempts: 1,
        })?;
        let concert_id = *self.concerts.random(ctx.rng()).ok_or(IterationError::SelectionExhausted {
            step: "fixtures",
            attempts: 1,
        })?;
        ctx.state.user_id = Some(user_id);
        ctx.state.concert_id = Some(concert_id);

        // token
        let (issued, _) = timed(&self.metrics.token_time, self.api.issue_token(user_id)).await;
        let issued = issued?;
        info!(
            user_id,
            queue_position = ?issued.queue_position,
            "Token issued"
        );
        ctx.state.token = Some(issued.token.clone());
        ctx.state.token_id = Some(issued.id.clone());
        let token = issued.token;

        // queue
        if issued.has_passed_queue {
            self.metrics.queue_wait_time.add(0.0);
        } else {
            self.wait_for_admission(&issued.id).await?;
        }

        // schedule
        let (dates, _) = timed(&self.metrics.schedule_time, self.api.available_dates(concert_id)).await;
        let dates = dates?;
        if dates.is_empty() {
            return Err(IterationError::SelectionExhausted {
                step: "schedule",
                attempts: 1,
            });
        }
        let schedule_date = dates[ctx.rng().gen_range(0..dates.len())].clone();
        debug!(%schedule_date, "Schedule selected");
        ctx.state.schedule_date = Some(schedule_date.clone());

        // seat
        let (seat, _) = {
            let (state, rng) = ctx.state_and_rng();
            timed(
                &self.metrics.seat_time,
                self.select_seat(concert_id, &schedule_date, &token, &state.excluded_seats, rng),
            )
            .await
        };
        let seat_id = seat?;

        // reservation
        let reserved = self
            .reserve(ctx, user_id, concert_id, &schedule_date, &token, seat_id)
            .await;
        self.metrics.reservation_success.add(reserved.is_ok());
        let reservation_id = reserved?;
        ctx.state.reservation_id = Some(reservation_id.clone());
        ctx.sleep(self.config.settle_delay).await;

        // payment
        let seat_id = ctx.state.seat_id.unwrap_or(seat_id);
        let (receipt, _) = timed(
            &self.metrics.payment_time,
            self.api
                .pay(&reservation_id, user_id, seat_id, &self.config.payment, &token),
        )
        .await;
        let receipt = receipt?;
        ctx.state.remaining_balance = receipt.remaining_balance;
        info!(remaining_balance = ?receipt.remaining_balance, "Payment completed");

        ctx.sleep(self.config.think_time).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadgen_engine::Executor;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quick_config() -> ReservationConfig {
        ReservationConfig {
            queue_poll_interval: Duration::from_millis(10),
            queue_max_wait: Duration::from_millis(100),
            seat_lookup_attempts: 2,
            seat_lookup_delay: Duration::from_millis(5),
            max_seat_attempts: 3,
            seat_retry_delay: Duration::from_millis(5),
            settle_delay: Duration::ZERO,
            think_time: Duration::ZERO,
            ..ReservationConfig::default()
        }
    }

    fn scenario(server: &MockServer, registry: &MetricsRegistry) -> ReservationScenario {
        scenario_with(server, registry, quick_config())
    }

    fn scenario_with(server: &MockServer, registry: &MetricsRegistry, config: ReservationConfig) -> ReservationScenario {
        let fixtures = FixtureStore::new();
        fixtures.get_or_init("users", || Ok::<_, String>(vec![7u64])).unwrap();
        fixtures.get_or_init("concerts", || Ok::<_, String>(vec![101u64])).unwrap();
        let builtin = EngineMetrics::register(registry).unwrap();
        let client = InstrumentedClient::new(Arc::new(HttpManager::new(&server.uri()).unwrap()), &builtin);
        let api = ReservationApi::new(Arc::new(client), "SEAT_ALREADY_RESERVED");
        ReservationScenario::new("ticket_reservation", api, config, &fixtures, registry).unwrap()
    }

    async fn mount_token(server: &MockServer, has_passed_queue: bool) {
        Mock::given(method("POST"))
            .and(path("/tokens/issue"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "id": 1, "token": "tok", "queuePosition": 0, "status": "ACTIVE", "hasPassedQueue": has_passed_queue }
            })))
            .mount(server)
            .await;
    }

    async fn mount_dates(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/concerts/101/dates/available"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": ["2025-03-01"] })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn queue_timeout_is_incomplete_not_failed() {
        let server = MockServer::start().await;
        mount_token(&server, false).await;
        Mock::given(method("GET"))
            .and(path("/tokens/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "WAITING" })))
            .mount(&server)
            .await;

        let registry = MetricsRegistry::new();
        let executor = Executor::new(Arc::new(scenario(&server, &registry)), registry.clone()).unwrap();
        let report = executor.run_iteration().await;

        assert!(matches!(
            report.outcome,
            loadgen_engine::IterationOutcome::TimedOut(IterationError::Timeout { step: "queue", .. })
        ));
        let summary = registry.summary();
        assert_eq!(summary.counter("iterations_timed_out").unwrap().count, 1);
        assert_eq!(summary.rate("iteration_errors").unwrap().passes, 0);
        // never reached the schedule step
        assert_eq!(summary.trend("schedule_time").unwrap().count, 0);
    }

    #[tokio::test]
    async fn conflicts_exhaust_shared_budget() {
        let server = MockServer::start().await;
        mount_token(&server, true).await;
        mount_dates(&server).await;
        Mock::given(method("GET"))
            .and(path("/concerts/101/seats/available"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": 1 }, { "id": 2 }, { "id": 3 }, { "id": 4 }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/reservations/101/reserve-seats"))
            .respond_with(ResponseTemplate::new(400).set_body_string("SEAT_ALREADY_RESERVED"))
            .mount(&server)
            .await;

        let registry = MetricsRegistry::new();
        let executor = Executor::new(Arc::new(scenario(&server, &registry)), registry.clone()).unwrap();
        let report = executor.run_iteration().await;

        assert!(matches!(
            report.outcome,
            loadgen_engine::IterationOutcome::Failed(IterationError::ConflictExhausted { attempts: 3, .. })
        ));
        assert_eq!(report.state.reserve_attempts, 3);
        assert_eq!(report.state.excluded_seats.len(), 3);
        let summary = registry.summary();
        assert_eq!(summary.trend("reserve_time").unwrap().count, 3);
        assert_eq!(summary.trend("seat_time").unwrap().count, 1);
        assert_eq!(summary.rate("reservation_success").unwrap().rate, 0.0);
        assert_eq!(summary.trend("queue_wait_time").unwrap().max, 0.0);
    }

    async fn seat_lookups(server: &MockServer) -> usize {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|request| request.url.path() == "/concerts/101/seats/available")
            .count()
    }

    #[tokio::test]
    async fn no_free_seat_times_out_without_error() {
        let server = MockServer::start().await;
        mount_token(&server, true).await;
        mount_dates(&server).await;
        Mock::given(method("GET"))
            .and(path("/concerts/101/seats/available"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let registry = MetricsRegistry::new();
        let executor = Executor::new(Arc::new(scenario(&server, &registry)), registry.clone()).unwrap();
        let report = executor.run_iteration().await;

        assert!(matches!(
            report.outcome,
            loadgen_engine::IterationOutcome::TimedOut(IterationError::Timeout { step: "seats", .. })
        ));
        assert_eq!(seat_lookups(&server).await, 2);
        let summary = registry.summary();
        assert_eq!(summary.rate("iteration_errors").unwrap().passes, 0);
        assert_eq!(summary.counter("iterations_timed_out").unwrap().count, 1);
        assert_eq!(summary.counter("iterations_incomplete").unwrap().count, 1);
        assert_eq!(summary.rate("reservation_success").unwrap().total, 0);
    }

    #[tokio::test]
    async fn empty_reselections_use_up_seat_budget() {
        let server = MockServer::start().await;
        mount_token(&server, true).await;
        mount_dates(&server).await;
        Mock::given(method("GET"))
            .and(path("/concerts/101/seats/available"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "id": 1 }] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/reservations/101/reserve-seats"))
            .respond_with(ResponseTemplate::new(400).set_body_string("SEAT_ALREADY_RESERVED"))
            .mount(&server)
            .await;

        let registry = MetricsRegistry::new();
        let executor = Executor::new(Arc::new(scenario(&server, &registry)), registry.clone()).unwrap();
        let report = executor.run_iteration().await;

        // one conflict, then two empty reselections exhaust a budget of three
        assert!(matches!(
            report.outcome,
            loadgen_engine::IterationOutcome::TimedOut(IterationError::Timeout { step: "seats", .. })
        ));
        assert!(report.state.excluded_seats.contains(&1));
        assert_eq!(report.state.reserve_attempts, 1);
        assert_eq!(seat_lookups(&server).await, 1 + 2 + 2);
        let summary = registry.summary();
        assert_eq!(summary.rate("reservation_success").unwrap().rate, 0.0);
        assert_eq!(summary.rate("iteration_errors").unwrap().passes, 0);
    }

    #[tokio::test]
    async fn reselection_recovers_within_budget() {
        let server = MockServer::start().await;
        mount_token(&server, true).await;
        mount_dates(&server).await;
        Mock::given(method("GET"))
            .and(path("/concerts/101/seats/available"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "id": 1 }] })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/concerts/101/seats/available"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/concerts/101/seats/available"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "id": 1 }, { "id": 2 }] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/reservations/101/reserve-seats"))
            .respond_with(ResponseTemplate::new(400).set_body_string("SEAT_ALREADY_RESERVED"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/reservations/101/reserve-seats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "reservationId": 9 } })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/reservations/9/payment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "remainingBalance": 10 })))
            .mount(&server)
            .await;

        let registry = MetricsRegistry::new();
        let executor = Executor::new(Arc::new(scenario(&server, &registry)), registry.clone()).unwrap();
        let report = executor.run_iteration().await;

        assert!(report.outcome.is_completed(), "{:?}", report.outcome);
        assert_eq!(report.state.reserve_attempts, 2);
        assert_eq!(report.state.seat_id, Some(2));
        assert_eq!(seat_lookups(&server).await, 4);

        // the same service with a budget of two gives up after the empty reselection
        let server_two = MockServer::start().await;
        mount_token(&server_two, true).await;
        mount_dates(&server_two).await;
        Mock::given(method("GET"))
            .and(path("/concerts/101/seats/available"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "id": 1 }] })))
            .up_to_n_times(1)
            .mount(&server_two)
            .await;
        Mock::given(method("GET"))
            .and(path("/concerts/101/seats/available"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server_two)
            .await;
        Mock::given(method("POST"))
            .and(path("/reservations/101/reserve-seats"))
            .respond_with(ResponseTemplate::new(400).set_body_string("SEAT_ALREADY_RESERVED"))
            .mount(&server_two)
            .await;

        let tight = ReservationConfig {
            max_seat_attempts: 2,
            ..quick_config()
        };
        let registry = MetricsRegistry::new();
        let executor = Executor::new(Arc::new(scenario_with(&server_two, &registry, tight)), registry).unwrap();
        let report = executor.run_iteration().await;

        assert!(matches!(
            report.outcome,
            loadgen_engine::IterationOutcome::TimedOut(IterationError::Timeout { step: "seats", .. })
        ));
        assert_eq!(report.state.reserve_attempts, 1);
        assert_eq!(seat_lookups(&server_two).await, 3);
    }

    #[tokio::test]
    async fn empty_schedule_aborts_before_seats() {
        let server = MockServer::start().await;
        mount_token(&server, true).await;
        Mock::given(method("GET"))
            .and(path("/concerts/101/dates/available"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let registry = MetricsRegistry::new();
        let executor = Executor::new(Arc::new(scenario(&server, &registry)), registry.clone()).unwrap();
        let report = executor.run_iteration().await;

        assert!(matches!(report.outcome, loadgen_engine::IterationOutcome::Failed(_)));
        assert_eq!(registry.summary().trend("seat_time").unwrap().count, 0);
        assert_eq!(registry.summary().rate("reservation_success").unwrap().total, 0);
    }
}
