//! Dashboard publisher tests against a mock endpoint.

use chrono::NaiveDate;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gridwatt::core::models::UsageReading;
use gridwatt::core::utility::Utility;
use gridwatt::error::GridwattError;
use gridwatt::publish::Publisher;
use gridwatt::storage::config::DashboardConfig;

fn dashboard(server: &MockServer) -> DashboardConfig {
    DashboardConfig {
        url: server.uri(),
        token: "ha-token".to_string(),
        entity_id: "sensor.nyseg_energy_usage".to_string(),
        rate: Some(0.201),
    }
}

fn hourly_reading() -> UsageReading {
    let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let start = date.and_hms_opt(13, 0, 0).unwrap();
    UsageReading::new(
        date,
        Some(start),
        Some(start + chrono::Duration::hours(1)),
        1.256,
        Utility::Nyseg,
    )
}

#[tokio::test]
async fn publish_sends_backfill_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/appdaemon/backfill_state"))
        .and(header("Authorization", "Bearer ha-token"))
        .and(body_json(serde_json::json!({
            "entity_id": "sensor.nyseg_energy_usage",
            "state": "1.26",
            "last_changed": "2024-03-01T13:00:00",
            "last_updated": "2024-03-01T13:00:00",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let publisher = Publisher::new(&dashboard(&server)).unwrap();
    publisher.publish(&hourly_reading()).await.expect("publish");
}

#[tokio::test]
async fn non_200_response_is_a_publish_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/appdaemon/backfill_state"))
        .respond_with(ResponseTemplate::new(500).set_body_string("appdaemon exploded"))
        .mount(&server)
        .await;

    let publisher = Publisher::new(&dashboard(&server)).unwrap();
    let err = publisher
        .publish(&hourly_reading())
        .await
        .expect_err("500");

    match err {
        GridwattError::PublishFailed { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("appdaemon exploded"));
        }
        other => panic!("expected PublishFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn statistics_compilation_reports_counts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/appdaemon/generate_statistics"))
        .and(body_json(serde_json::json!({
            "entity_id": "sensor.nyseg_energy_usage"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "inserted": 24, "updated": 3, "total_hours": 720
        })))
        .mount(&server)
        .await;

    let publisher = Publisher::new(&dashboard(&server)).unwrap();
    let stats = publisher.generate_statistics().await.expect("stats");

    assert_eq!(stats.inserted, 24);
    assert_eq!(stats.updated, 3);
    assert_eq!(stats.total_hours, 720);
}

#[tokio::test]
async fn cost_statistics_carry_the_rate() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/appdaemon/generate_cost_statistics"))
        .and(body_json(serde_json::json!({
            "energy_entity_id": "sensor.nyseg_energy_usage",
            "cost_entity_id": "sensor.nyseg_energy_usage_cost",
            "rate": "0.25",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "inserted": 24, "updated": 0, "total_cost": 42.5, "rate_used": 0.25
        })))
        .mount(&server)
        .await;

    let publisher = Publisher::new(&dashboard(&server)).unwrap();
    // Flag rate overrides the configured 0.201.
    let cost = publisher
        .generate_cost_statistics(Some(0.25))
        .await
        .expect("cost stats");

    assert!((cost.total_cost - 42.5).abs() < 1e-9);
    assert!((cost.rate_used - 0.25).abs() < 1e-9);
}
