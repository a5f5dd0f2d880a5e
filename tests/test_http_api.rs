// Integration tests for the HTTP surface: identity, role checks and error mapping
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use evdesk::application::services::AssignmentSettings;
use evdesk::bootstrap::assemble_app_state;
use evdesk::domain::ports::{PushProvider, TaskSpawner};
use evdesk::infrastructure::http::build_router;
use evdesk::infrastructure::realtime::RealtimeState;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

mod helpers;
use helpers::*;

async fn test_app() -> (TestDb, Router) {
    let test_db = setup_test_db().await;
    let state = assemble_app_state(
        test_db.db.clone(),
        RealtimeState::new(),
        Arc::new(MockPushProvider::default()) as Arc<dyn PushProvider>,
        Arc::new(RecordingSpawner::default()) as Arc<dyn TaskSpawner>,
        AssignmentSettings::default(),
    );
    (test_db, build_router(state))
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    identity: Option<(&str, &str)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((user_id, role)) = identity {
        builder = builder.header("x-user-id", user_id).header("x-user-role", role);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_is_public() {
    let (_db, app) = test_app().await;
    let (status, _) = call(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let (_db, app) = test_app().await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/chat/messages",
        None,
        Some(json!({ "content": "Hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn test_chat_flow_over_http() {
    let (_db, app) = test_app().await;
    let customer = Some(("u1", "customer"));
    let staff_a = Some(("staffA", "staff"));
    let staff_b = Some(("staffB", "staff"));

    let (status, body) = call(
        &app,
        "POST",
        "/api/chat/messages",
        customer,
        Some(json!({ "content": "My charger is offline" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["is_new_conversation"], true);
    let id = body["conversation"]["id"].as_str().unwrap().to_string();

    // Staff-only routes refuse customers
    let (status, _) = call(
        &app,
        "GET",
        "/api/chat/conversations/waiting",
        customer,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        "GET",
        "/api/chat/conversations/waiting?page=1&limit=10",
        staff_a,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_count"], 1);

    let take_uri = format!("/api/chat/conversations/{}/take", id);
    let (status, body) = call(&app, "POST", &take_uri, staff_a, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assigned_staff_id"], "staffA");

    let (status, body) = call(&app, "POST", &take_uri, staff_b, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let messages_uri = format!("/api/chat/conversations/{}/messages", id);
    let (status, _) = call(
        &app,
        "POST",
        &messages_uri,
        staff_b,
        Some(json!({ "content": "Hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        "POST",
        &messages_uri,
        staff_a,
        Some(json!({ "content": "Hi, checking now" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["sender_role"], "staff");

    let (status, body) = call(
        &app,
        "GET",
        "/api/chat/conversations/mine",
        staff_a,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = call(
        &app,
        "GET",
        "/api/chat/conversations/mine?status=archived",
        staff_a,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Another customer cannot read this conversation
    let history_uri = format!("/api/chat/conversations/{}", id);
    let (status, _) = call(&app, "GET", &history_uri, Some(("u2", "customer")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, "GET", &history_uri, customer, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"].as_array().unwrap().len(), 3);
    assert_eq!(body["pagination"]["total_messages"], 3);

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/chat/conversations/{}/read", id),
        customer,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marked"], 2);

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/chat/conversations/{}/close", id),
        customer,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "closed");
}

#[tokio::test]
async fn test_staff_logout_and_roll_call() {
    let (_db, app) = test_app().await;

    let (_, body) = call(
        &app,
        "POST",
        "/api/chat/messages",
        Some(("u1", "customer")),
        Some(json!({ "content": "Hello" })),
    )
    .await;
    let id = body["conversation"]["id"].as_str().unwrap().to_string();
    call(
        &app,
        "POST",
        &format!("/api/chat/conversations/{}/take", id),
        Some(("staffA", "staff")),
        None,
    )
    .await;

    let (status, body) = call(&app, "POST", "/api/staff/logout", Some(("staffA", "staff")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released_conversation_ids"], json!([id]));

    let (status, body) = call(&app, "GET", "/api/staff/online", Some(("staffA", "admin")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["staff_ids"], json!([]));
}

#[tokio::test]
async fn test_device_routes() {
    let (_db, app) = test_app().await;
    let customer = Some(("u1", "customer"));

    let (status, body) = call(
        &app,
        "POST",
        "/api/devices",
        customer,
        Some(json!({ "token": "u1-phone", "platform": "ios" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["owner_id"], "u1");

    let (status, _) = call(&app, "DELETE", "/api/devices/u1-phone", customer, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app, "DELETE", "/api/devices/u1-phone", customer, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
