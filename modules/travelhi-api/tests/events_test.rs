mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;

use common::{request, send};
use travelhi_api::disruptions::{DisruptionCategory, DisruptionPrediction, DisruptionSeverity};
use travelhi_api::testing::{test_config, StaticClassifier, TestApp};
use travelhi_common::{EventType, Location, NewEvent, Role, Severity};
use travelhi_store::testing::KRAKOW;

fn event(event_type: EventType, severity: Severity, is_verified: bool) -> NewEvent {
    NewEvent {
        event_type,
        severity,
        description: None,
        location: Location::new(KRAKOW.0, KRAKOW.1).unwrap(),
        is_verified,
    }
}

#[tokio::test]
async fn creating_events_requires_manage_events() {
    let app = TestApp::new();
    let router = app.router();
    let (_, user) = app.user_with_token("jan", Role::User).await;
    let (_, moderator) = app.user_with_token("mod", Role::Moderator).await;
    let body = json!({
        "type": "BLOCKAGE",
        "severity": "HIGH",
        "description": "Zamknięty wiadukt",
        "lat": 50.06,
        "lng": 19.94,
    });

    let (status, _) = send(&router, request(Method::POST, "/api/v1/events", Some(&user), Some(body.clone()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = send(&router, request(Method::POST, "/api/v1/events", Some(&moderator), Some(body))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["type"], "BLOCKAGE");
    assert_eq!(created["is_verified"], false);

    let (status, all) = send(&router, request(Method::GET, "/api/v1/events", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn events_by_day_covers_the_whole_utc_day() {
    let app = TestApp::new();
    let day = Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap();
    app.store.insert_event_at(&event(EventType::Delay, Severity::Low, true), day);
    app.store.insert_event_at(
        &event(EventType::Delay, Severity::Low, true),
        day + Duration::hours(23) + Duration::minutes(59),
    );
    app.store.insert_event_at(&event(EventType::Delay, Severity::Low, true), day + Duration::days(1));

    let (status, body) = send(
        &app.router(),
        request(Method::GET, "/api/v1/events/by-day?day=2024-05-10", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn events_around_filters_and_bounds_threshold() {
    let app = TestApp::new();
    let router = app.router();
    let at = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
    app.store.insert_event_at(&event(EventType::Accident, Severity::High, true), at - Duration::hours(1));
    app.store.insert_event_at(&event(EventType::Accident, Severity::Low, true), at);
    app.store.insert_event_at(&event(EventType::Delay, Severity::High, true), at);
    app.store.insert_event_at(&event(EventType::Accident, Severity::High, false), at);
    app.store.insert_event_at(&event(EventType::Accident, Severity::High, true), at + Duration::hours(5));

    let (status, body) = send(
        &router,
        request(
            Method::GET,
            "/api/v1/events/around?at=2024-05-10T12:00:00Z&threshold_hours=2&event_type=ACCIDENT&severity=HIGH&is_verified=true",
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(
        &router,
        request(
            Method::GET,
            "/api/v1/events/around?at=2024-05-10T12:00:00Z&threshold_hours=25",
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn prediction_returns_structured_output() {
    let prediction = DisruptionPrediction {
        category: DisruptionCategory::Accident,
        severity: DisruptionSeverity::High,
        confidence: 0.9,
        summary: "Two lanes closed".to_string(),
    };
    let app = TestApp::with(test_config(), StaticClassifier::allowing(), Some(prediction));

    let (status, body) = send(
        &app.router(),
        request(
            Method::POST,
            "/api/v1/disruptions/predict",
            None,
            Some(json!({
                "source": "twitter",
                "content": "Wypadek na A4, dwa pasy zablokowane",
                "timestamp": "2024-05-10T12:00:00Z",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], "ACCIDENT");
    assert_eq!(body["severity"], "HIGH");
}

#[tokio::test]
async fn prediction_failure_is_service_unavailable() {
    let app = TestApp::new();

    let (status, body) = send(
        &app.router(),
        request(
            Method::POST,
            "/api/v1/disruptions/predict",
            None,
            Some(json!({
                "source": "rss",
                "content": "Opóźnienia tramwajów",
                "timestamp": "2024-05-10T12:00:00Z",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["detail"].as_str().unwrap().contains("LLM error"));
}

#[tokio::test]
async fn health_and_no_store_header() {
    let app = TestApp::new();
    let response = tower::ServiceExt::oneshot(
        app.router(),
        request(Method::GET, "/health", None, None),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["cache-control"], "no-store");
}
