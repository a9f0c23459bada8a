mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{next_frame, request, send, Form};
use travelhi_api::testing::{test_config, StaticClassifier, TestApp, PNG_BYTES};
use travelhi_common::{CounterPolicy, Role};

#[tokio::test]
async fn create_then_like_twice_counts_up() {
    let app = TestApp::new();
    let router = app.router();

    let (status, body) = send(
        &router,
        Form::incident("accident", 50.0614, 19.9366)
            .text("description", "Zderzenie dwóch aut na rondzie")
            .into_request(None),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["type"], "accident");
    assert_eq!(body["likes"], 0);
    assert_eq!(body["is_verified"], false);
    assert!(body["user_id"].is_null());

    let id = body["id"].as_i64().unwrap();
    let uri = format!("/api/v1/incidents/{id}/like");
    let (_, first) = send(&router, request(Method::POST, &uri, None, None)).await;
    let (status, second) = send(&router, request(Method::POST, &uri, None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["likes"], 1);
    assert_eq!(second["likes"], 2);
    assert_eq!(second["confirmations"], 0);
    assert_eq!(second["denials"], 0);
}

#[tokio::test]
async fn created_incident_is_broadcast_with_author() {
    let app = TestApp::new();
    let (user, token) = app.user_with_token("jan", Role::User).await;
    let (handle, mut rx) = app.state.broadcaster.open();
    app.state.broadcaster.connect(&handle).await;

    let (status, body) = send(
        &app.router(),
        Form::incident("delay", 52.2297, 21.0122)
            .text("name", "Korek na moście")
            .into_request(Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user_id"], user.id);

    let frame = next_frame(&mut rx).await.expect("incident notice");
    assert_eq!(frame["type"], "incident");
    assert_eq!(frame["user"], "jan");
    assert_eq!(frame["message"], "Korek na moście");
    assert_eq!(frame["lat"], 52.2297);
    assert_eq!(frame["likes"], 0);
}

#[tokio::test]
async fn anonymous_notice_uses_placeholder_name() {
    let app = TestApp::new();
    let (handle, mut rx) = app.state.broadcaster.open();
    app.state.broadcaster.connect(&handle).await;

    send(&app.router(), Form::incident("other", 50.0, 20.0).into_request(None)).await;

    let frame = next_frame(&mut rx).await.expect("incident notice");
    assert_eq!(frame["user"], "Anonim");
}

#[tokio::test]
async fn invalid_coordinates_are_rejected_without_a_row() {
    let app = TestApp::new();
    let router = app.router();

    let (status, body) = send(&router, Form::incident("accident", 91.0, 19.0).into_request(None)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].is_string());

    let (status, _) = send(&router, Form::incident("accident", 50.0, -181.0).into_request(None)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.store.report_count(), 0);
}

#[tokio::test]
async fn unknown_type_and_missing_fields_are_validation_errors() {
    let app = TestApp::new();
    let router = app.router();

    let (status, _) = send(&router, Form::incident("meteor", 50.0, 20.0).into_request(None)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(
        &router,
        Form::default().text("type", "delay").text("lat", "50.0").into_request(None),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"], "Missing form field 'lng'");
    assert_eq!(app.store.report_count(), 0);
}

#[tokio::test]
async fn profanity_is_rejected_before_the_classifier() {
    let app = TestApp::new();
    let (handle, mut rx) = app.state.broadcaster.open();
    app.state.broadcaster.connect(&handle).await;

    let (status, body) = send(
        &app.router(),
        Form::incident("accident", 50.0, 20.0)
            .text("description", "k.u.r.w.a znowu korek")
            .into_request(None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Description contains inappropriate content.");
    assert_eq!(app.store.report_count(), 0);
    assert_eq!(app.classifier.calls(), 0);
    assert!(next_frame(&mut rx).await.is_none());
}

#[tokio::test]
async fn classifier_flag_rejects_name() {
    let app = TestApp::with(test_config(), StaticClassifier::flagging(&["harassment"]), None);

    let (status, body) = send(
        &app.router(),
        Form::incident("delay", 50.0, 20.0)
            .text("name", "something rude")
            .into_request(None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Name contains inappropriate content.");
    assert_eq!(app.store.report_count(), 0);
}

#[tokio::test]
async fn photo_is_stored_and_served_as_absolute_url() {
    let app = TestApp::new();

    let (status, body) = send(
        &app.router(),
        Form::incident("blockage", 50.0, 20.0)
            .file("photo", "crash.png", "image/png", PNG_BYTES)
            .into_request(None),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let url = body["photo_url"].as_str().unwrap();
    assert!(url.starts_with("http://testserver/uploads/"), "{url}");
    assert!(url.ends_with(".png"));
    assert_eq!(app.images.stored(), 1);
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let app = TestApp::new();

    let (status, _) = send(
        &app.router(),
        Form::incident("blockage", 50.0, 20.0)
            .file("photo", "notes.txt", "text/plain", b"just text")
            .into_request(None),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.images.stored(), 0);
    assert_eq!(app.store.report_count(), 0);
}

#[tokio::test]
async fn missing_incident_is_not_found() {
    let router = TestApp::new().router();

    let (status, body) = send(&router, request(Method::GET, "/api/v1/incidents/999", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());

    let (status, _) = send(
        &router,
        request(Method::POST, "/api/v1/incidents/999/confirm", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn verify_requires_permission_and_broadcasts() {
    let app = TestApp::new();
    let router = app.router();
    let (_, user_token) = app.user_with_token("kasia", Role::User).await;
    let (_, mod_token) = app.user_with_token("moderator", Role::Moderator).await;

    let (_, created) = send(&router, Form::incident("accident", 50.0, 20.0).into_request(None)).await;
    let uri = format!("/api/v1/incidents/{}/verify", created["id"]);

    let (status, _) = send(&router, request(Method::POST, &uri, None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&router, request(Method::POST, &uri, Some(&user_token), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (handle, mut rx) = app.state.broadcaster.open();
    app.state.broadcaster.connect(&handle).await;

    let (status, body) = send(&router, request(Method::POST, &uri, Some(&mod_token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_verified"], true);

    let frame = next_frame(&mut rx).await.expect("verified notice");
    assert_eq!(frame, json!({ "type": "verified", "id": created["id"] }));
}

#[tokio::test]
async fn authenticated_counter_policy_rejects_anonymous_votes() {
    let mut config = test_config();
    config.counter_policy = CounterPolicy::Authenticated;
    let app = TestApp::with(config, StaticClassifier::allowing(), None);
    let router = app.router();
    let (_, token) = app.user_with_token("ola", Role::User).await;

    let (_, created) = send(&router, Form::incident("delay", 50.0, 20.0).into_request(None)).await;
    let uri = format!("/api/v1/incidents/{}/deny", created["id"]);

    let (status, _) = send(&router, request(Method::POST, &uri, None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&router, request(Method::POST, &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["denials"], 1);
}

#[tokio::test]
async fn radius_listing_filters_and_paginates() {
    let app = TestApp::new();
    let router = app.router();

    for _ in 0..3 {
        send(&router, Form::incident("delay", 50.0614, 19.9366).into_request(None)).await;
    }
    // Warsaw, far outside the default radius around Krakow.
    send(&router, Form::incident("delay", 52.2297, 21.0122).into_request(None)).await;

    let (status, body) = send(
        &router,
        request(
            Method::GET,
            "/api/v1/incidents?lat=50.06&lng=19.94&radius=5000&skip=1&limit=1",
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        &router,
        request(Method::GET, "/api/v1/incidents?lat=50&lng=20&limit=500", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &router,
        request(Method::GET, "/api/v1/incidents?lat=50&lng=20&radius=-1", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn recent_defaults_to_last_day() {
    let app = TestApp::new();
    let router = app.router();
    send(&router, Form::incident("other", 50.0, 20.0).into_request(None)).await;

    let (status, body) = send(&router, request(Method::GET, "/api/v1/incidents/recent", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, body) = send(
        &router,
        request(
            Method::GET,
            "/api/v1/incidents/recent?since=2020-01-01T00:00:00Z&until=2020-01-02T00:00:00Z",
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}
