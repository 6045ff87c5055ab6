//! One reservation iteration against a mock ticketing service, wired from
//! a YAML configuration the way the CLI wires a run.

use loadgen_config::{ConfigLoader, LoadConfig};
use loadgen_engine::{Executor, IterationOutcome};
use loadgen_metrics::MetricsRegistry;
use loadgen_reservation::{ReservationScenario, ResourceId};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> LoadConfig {
    let yaml = format!(
        r#"
scenario:
  name: e2e
  arrival:
    executor: constant-arrival-rate
    rate: 1
    duration: 1s
    pre_allocated_vus: 1
target:
  base_url: {}
fixtures:
  users:
    type: values
    values: [7]
  concerts:
    type: values
    values: [101]
reservation:
  queue_poll_interval: 10ms
  queue_max_wait: 2s
  seat_lookup_attempts: 2
  seat_lookup_delay: 5ms
  max_seat_attempts: 3
  seat_retry_delay: 5ms
  settle_delay: 0s
  think_time: 0s
"#,
        server.uri()
    );
    ConfigLoader::with_prefix("LOADGEN_E2E").from_yaml(&yaml).unwrap()
}

async fn mount_happy_path(server: &MockServer, has_passed_queue: bool) {
    Mock::given(method("POST"))
        .and(path("/tokens/issue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": 900,
                "token": "queue-token",
                "queuePosition": 3,
                "status": "WAITING",
                "hasPassedQueue": has_passed_queue
            }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/concerts/101/dates/available"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": ["2025-03-01"] })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/concerts/101/seats/available"))
        .and(query_param("scheduleDate", "2025-03-01"))
        .and(header("QUEUE-TOKEN", "queue-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": 1 }, { "id": 2 }]
        })))
        .mount(server)
        .await;
}

async fn mount_payment(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/reservations/77/payment"))
        .and(header("QUEUE-TOKEN", "queue-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "remainingBalance": 150000 })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn queued_user_reserves_after_one_conflict() {
    let server = MockServer::start().await;
    mount_happy_path(&server, false).await;

    // Pending twice, then admitted
    Mock::given(method("GET"))
        .and(path("/tokens/status"))
        .and(query_param("tokenId", "900"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "WAITING" })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tokens/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ACTIVE" })))
        .mount(&server)
        .await;

    // The first seat chosen is taken, the second succeeds
    Mock::given(method("POST"))
        .and(path("/reservations/101/reserve-seats"))
        .respond_with(ResponseTemplate::new(400).set_body_string("SEAT_ALREADY_RESERVED"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/reservations/101/reserve-seats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "reservationId": 77 } })))
        .mount(&server)
        .await;
    mount_payment(&server).await;

    let config = config_for(&server);
    let registry = MetricsRegistry::new();
    let scenario = ReservationScenario::from_config(&config, &registry).unwrap();
    let executor = Executor::new(Arc::new(scenario), registry.clone()).unwrap();

    let report = executor.run_iteration().await;

    assert!(matches!(report.outcome, IterationOutcome::Completed), "{:?}", report.outcome);
    let state = report.state;
    assert_eq!(state.user_id, Some(7));
    assert_eq!(state.concert_id, Some(101));
    assert_eq!(state.reserve_attempts, 2);
    assert_eq!(state.excluded_seats.len(), 1);
    let reserved_seat = state.seat_id.unwrap();
    assert!(!state.excluded_seats.contains(&reserved_seat));
    assert_eq!(state.reservation_id, Some(ResourceId::Number(77)));
    assert_eq!(state.remaining_balance, Some(150000.0));

    let summary = registry.summary();
    for name in ["token_time", "queue_wait_time", "schedule_time", "seat_time", "payment_time"] {
        assert_eq!(summary.trend(name).unwrap().count, 1, "{}", name);
    }
    assert_eq!(summary.trend("reserve_time").unwrap().count, 2);
    assert_eq!(summary.rate("reservation_success").unwrap().rate, 1.0);
    assert_eq!(summary.counter("iterations").unwrap().count, 1);
    assert_eq!(summary.rate("iteration_errors").unwrap().passes, 0);

    // token, 3 status polls, dates, 2 seat lookups, 2 reservations, payment
    assert_eq!(summary.counter("http_reqs").unwrap().count, 10);
    // the conflict answered 400
    assert_eq!(summary.rate("http_req_failed").unwrap().passes, 1);
}

#[tokio::test]
async fn failed_payment_fails_the_iteration() {
    let server = MockServer::start().await;
    mount_happy_path(&server, true).await;
    Mock::given(method("POST"))
        .and(path("/reservations/101/reserve-seats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "reservationId": 77 } })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/reservations/77/payment"))
        .respond_with(ResponseTemplate::new(500).set_body_string("ledger unavailable"))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let registry = MetricsRegistry::new();
    let scenario = ReservationScenario::from_config(&config, &registry).unwrap();
    let executor = Executor::new(Arc::new(scenario), registry.clone()).unwrap();

    let report = executor.run_iteration().await;

    match &report.outcome {
        IterationOutcome::Failed(error) => assert_eq!(error.step(), "payment"),
        other => panic!("expected payment failure, got {:?}", other),
    }
    let summary = registry.summary();
    // reservation itself succeeded
    assert_eq!(summary.rate("reservation_success").unwrap().rate, 1.0);
    assert_eq!(summary.rate("iteration_errors").unwrap().passes, 1);
    assert_eq!(summary.trend("queue_wait_time").unwrap().max, 0.0);
    assert_eq!(summary.trend("payment_time").unwrap().count, 1);
}
