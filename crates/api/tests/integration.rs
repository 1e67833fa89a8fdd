//! Integration tests for API routes.
//!
//! Uses `tower::ServiceExt` to drive the Axum router without a real HTTP
//! server, over the in-memory membership store and recording delivery clients.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::NaiveDate;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use chit_api::routes::create_router;
use chit_api::state::AppState;
use chit_common::types::ContributionStatus;
use chit_engine::ledger::InMemoryReminderLedger;
use chit_engine::memory::InMemoryMembershipStore;
use chit_engine::router::EventRouter;
use chit_engine::scheduler::ReminderScheduler;
use chit_notifier::push::{PushTicket, TicketStatus};
use chit_notifier::{BatchDispatcher, NotifierError, PushClient, PushMessage, SmsFallbackNotifier};

// ============================================================
// Helpers
// ============================================================

#[derive(Default)]
struct AcceptingPush {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl PushClient for AcceptingPush {
    async fn send_chunk(&self, chunk: &[PushMessage]) -> Result<Vec<PushTicket>, NotifierError> {
        self.sent
            .lock()
            .unwrap()
            .extend(chunk.iter().map(|m| m.to.clone()));
        Ok(chunk
            .iter()
            .map(|_| PushTicket {
                status: TicketStatus::Ok,
                id: Some("ticket".to_string()),
                message: None,
                details: None,
            })
            .collect())
    }
}

struct TestApp {
    app: Router,
    store: Arc<InMemoryMembershipStore>,
    push: Arc<AcceptingPush>,
}

fn build_test_app() -> TestApp {
    let store = Arc::new(InMemoryMembershipStore::new());
    let push = Arc::new(AcceptingPush::default());
    let router = Arc::new(EventRouter::new(
        store.clone(),
        BatchDispatcher::with_limits(push.clone(), 100, 2),
        SmsFallbackNotifier::disabled(),
    ));
    let scheduler = Arc::new(ReminderScheduler::new(
        store.clone(),
        router.clone(),
        Arc::new(InMemoryReminderLedger::new()),
    ));

    TestApp {
        app: create_router(AppState::new(router, scheduler)),
        store,
        push,
    }
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

// ============================================================
// Routes
// ============================================================

#[tokio::test]
async fn test_health_endpoint() {
    let TestApp { app, .. } = build_test_app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "chit-api");
    assert_eq!(json["delivery"]["sms"], false);
    assert_eq!(json["delivery"]["pushBatchSize"], 100);
    assert_eq!(json["scheduler"], "idle");
}

#[tokio::test]
async fn test_dispatch_delivers_to_group() {
    let TestApp { app, store, push } = build_test_app();
    let group_id = store.add_group("Office Circle", 5000.0, None);
    let user = store.add_member(group_id, "Ravi", ContributionStatus::Paid);
    store.add_push_token(user, "tok-ravi");

    let response = app
        .oneshot(post_json(
            "/api/notifications",
            &json!({"type": "lucky_draw", "data": {"groupId": group_id, "winnerName": "Ravi", "amount": 50000}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["type"], "lucky_draw");
    assert_eq!(json["counts"]["ok"], 1);
    assert_eq!(json["results"][0]["channel"], "push");
    assert_eq!(json["results"][0]["status"], "ok");
    assert_eq!(*push.sent.lock().unwrap(), vec!["tok-ravi".to_string()]);
}

#[tokio::test]
async fn test_empty_audience_is_success() {
    let TestApp { app, store, .. } = build_test_app();
    let group_id = store.add_group("Empty", 1000.0, None);

    let response = app
        .oneshot(post_json(
            "/api/notifications",
            &json!({"type": "draw_completed", "data": {"groupId": group_id}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "No members to notify");
    assert_eq!(json["results"], json!([]));
}

#[tokio::test]
async fn test_unknown_kind_is_bad_request() {
    let TestApp { app, .. } = build_test_app();

    let response = app
        .oneshot(post_json(
            "/api/notifications",
            &json!({"type": "birthday", "data": {}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = read_json(response).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("birthday"));
}

#[tokio::test]
async fn test_missing_field_is_bad_request() {
    let TestApp { app, .. } = build_test_app();

    let response = app
        .oneshot(post_json(
            "/api/notifications",
            &json!({"type": "single_notification", "data": {"userId": Uuid::new_v4()}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_group_is_not_found() {
    let TestApp { app, .. } = build_test_app();

    let response = app
        .oneshot(post_json(
            "/api/notifications",
            &json!({"type": "winner_declared", "data": {"groupId": Uuid::new_v4()}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_store_outage_is_server_error() {
    let TestApp { app, store, .. } = build_test_app();
    store.set_failing(true);

    let response = app
        .oneshot(post_json(
            "/api/notifications",
            &json!({"type": "lucky_draw", "data": {"groupId": Uuid::new_v4(), "groupName": "Known"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = read_json(response).await;
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_get_on_notifications_is_method_not_allowed() {
    let TestApp { app, .. } = build_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/notifications")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_malformed_json_is_client_error() {
    let TestApp { app, .. } = build_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/notifications")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_reminder_run_is_deduplicated_per_day() {
    let TestApp { app, store, push } = build_test_app();
    let draw = NaiveDate::from_ymd_opt(2024, 6, 11).unwrap();
    let group_id = store.add_group("Office Circle", 5000.0, Some(draw));
    let user = store.add_member(group_id, "Ravi", ContributionStatus::Pending);
    store.add_push_token(user, "tok-ravi");

    let run = || {
        Request::builder()
            .method("POST")
            .uri("/api/reminders/run?date=2024-06-10")
            .body(Body::empty())
            .unwrap()
    };

    let first = app.clone().oneshot(run()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = read_json(first).await;
    assert_eq!(first["date"], "2024-06-10");
    assert_eq!(first["groups"], 1);
    assert_eq!(first["dispatched"], 1);

    let second = read_json(app.oneshot(run()).await.unwrap()).await;
    assert_eq!(second["dispatched"], 0);
    assert_eq!(second["skipped"], 1);

    assert_eq!(push.sent.lock().unwrap().len(), 1);
}
