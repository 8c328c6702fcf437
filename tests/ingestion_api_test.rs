// Integration tests for POST /api/bot/status and POST /api/esp-now/message

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use corral::api::{create_ingestion_router, AppState};
use corral::hub::{BroadcastHub, ServerMessage};
use corral::registry::Registry;
use corral::storage::{StatusStore, StoreJob};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;

fn test_state() -> (Arc<AppState>, mpsc::Receiver<StoreJob>) {
    let (store_tx, store_rx) = mpsc::channel(16);
    let state = Arc::new(AppState {
        registry: Arc::new(Registry::new(30)),
        hub: Arc::new(BroadcastHub::new(16)),
        store: Arc::new(StatusStore::open_in_memory().unwrap()),
        store_tx,
    });
    (state, store_rx)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_status_report_registers_agent() {
    let (state, mut store_rx) = test_state();
    let app: Router = create_ingestion_router(Arc::clone(&state));

    let response = app
        .oneshot(post_json(
            "/api/bot/status",
            serde_json::json!({
                "id": "rover-1",
                "reported_status": "ok",
                "battery_level": 75.0,
                "radio_signal": -55
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");

    let record = state.registry.get("rover-1").unwrap();
    assert_eq!(record.battery_level, Some(75.0));
    assert_eq!(record.connection_count, 1);

    // Persistence job was queued fire-and-forget
    match store_rx.try_recv().unwrap() {
        StoreJob::Status { report, .. } => assert_eq!(report.id, "rover-1"),
        other => panic!("unexpected job: {:?}", other),
    }
}

#[tokio::test]
async fn test_status_report_broadcasts_bot_update() {
    let (state, _store_rx) = test_state();
    let app = create_ingestion_router(Arc::clone(&state));

    let mut sub = state.hub.subscribe(ServerMessage::initial_data(vec![]));
    sub.rx.try_recv().unwrap(); // initial

    let response = app
        .oneshot(post_json(
            "/api/bot/status",
            serde_json::json!({"id": "rover-1", "reported_status": "charging"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    match sub.rx.try_recv().unwrap() {
        ServerMessage::BotUpdate { bot_id, data, .. } => {
            assert_eq!(bot_id, "rover-1");
            assert_eq!(data.record.reported_status, "charging");
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_battery_rejected_before_mutation() {
    let (state, mut store_rx) = test_state();
    let app = create_ingestion_router(Arc::clone(&state));

    let response = app
        .oneshot(post_json(
            "/api/bot/status",
            serde_json::json!({
                "id": "rover-1",
                "reported_status": "ok",
                "battery_level": 140.0
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(state.registry.is_empty());
    assert!(store_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_empty_id_rejected() {
    let (state, _store_rx) = test_state();
    let app = create_ingestion_router(state);

    let response = app
        .oneshot(post_json(
            "/api/bot/status",
            serde_json::json!({"id": "", "reported_status": "ok"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("id"));
}

#[tokio::test]
async fn test_merge_preserves_absent_fields_across_requests() {
    let (state, _store_rx) = test_state();
    let app = create_ingestion_router(Arc::clone(&state));

    let first = app
        .clone()
        .oneshot(post_json(
            "/api/bot/status",
            serde_json::json!({
                "id": "rover-1",
                "reported_status": "ok",
                "battery_level": 15.0
            }),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(post_json(
            "/api/bot/status",
            serde_json::json!({"id": "rover-1", "reported_status": "ok"}),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    let record = state.registry.get("rover-1").unwrap();
    assert_eq!(record.battery_level, Some(15.0));
    assert_eq!(record.connection_count, 2);
}

#[tokio::test]
async fn test_esp_now_message_queued_and_broadcast() {
    let (state, mut store_rx) = test_state();
    let app = create_ingestion_router(Arc::clone(&state));

    let mut sub = state.hub.subscribe(ServerMessage::initial_data(vec![]));
    sub.rx.try_recv().unwrap();

    let response = app
        .oneshot(post_json(
            "/api/esp-now/message",
            serde_json::json!({
                "sender_mac": "AA:BB:CC:DD:EE:01",
                "receiver_mac": "AA:BB:CC:DD:EE:02",
                "message_type": "telemetry",
                "payload": {"hops": 1},
                "rssi": -62
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(matches!(
        store_rx.try_recv().unwrap(),
        StoreJob::EspNow { .. }
    ));
    assert!(matches!(
        sub.rx.try_recv().unwrap(),
        ServerMessage::EspNowActivity { .. }
    ));
}

#[tokio::test]
async fn test_esp_now_missing_field_rejected() {
    let (state, _store_rx) = test_state();
    let app = create_ingestion_router(state);

    let response = app
        .oneshot(post_json(
            "/api/esp-now/message",
            serde_json::json!({
                "sender_mac": "",
                "receiver_mac": "AA:BB:CC:DD:EE:02",
                "message_type": "telemetry",
                "payload": {}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
