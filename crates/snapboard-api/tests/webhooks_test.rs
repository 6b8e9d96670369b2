//! Media store webhook receiver.

mod helpers;

use bytes::Bytes;
use helpers::{api_path, setup_test_app, setup_test_app_with, WEBHOOK_SECRET};
use serde_json::Value;
use snapboard_infra::webhook::{sign_payload, SIGNATURE_HEADER, TIMESTAMP_HEADER};

const WEBHOOK: &str = "/webhooks/media";

fn notification(public_id: &str) -> String {
    format!(
        r#"{{"notification_type":"update","public_id":"{}"}}"#,
        public_id
    )
}

async fn list_alice(app: &helpers::TestApp) {
    let response = app
        .client()
        .get(&api_path("/photos"))
        .add_query_param("userId", "alice")
        .add_query_param("gameNumber", 1)
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_signed_notification_invalidates_listing() {
    let app = setup_test_app();
    let id = app.seed_photo("alice", 1, "a");
    list_alice(&app).await;

    let body = notification(&id);
    let timestamp = chrono::Utc::now().timestamp();
    let signature = sign_payload(WEBHOOK_SECRET, timestamp, body.as_bytes());

    let response = app
        .client()
        .post(&api_path(WEBHOOK))
        .add_header(SIGNATURE_HEADER, signature)
        .add_header(TIMESTAMP_HEADER, timestamp.to_string())
        .bytes(Bytes::from(body))
        .await;

    assert_eq!(response.status_code(), 200);
    let ack: Value = response.json();
    assert_eq!(ack["verified"], true);
    assert_eq!(ack["invalidated"], 1);

    list_alice(&app).await;
    assert_eq!(app.store.list_calls(), 2);
}

#[tokio::test]
async fn test_bad_signature_is_unauthorized() {
    let app = setup_test_app();
    let id = app.seed_photo("alice", 1, "a");
    list_alice(&app).await;

    let timestamp = chrono::Utc::now().timestamp();
    let signature = sign_payload("wrong-secret", timestamp, notification(&id).as_bytes());

    let response = app
        .client()
        .post(&api_path(WEBHOOK))
        .add_header(SIGNATURE_HEADER, signature)
        .add_header(TIMESTAMP_HEADER, timestamp.to_string())
        .bytes(Bytes::from(notification(&id)))
        .await;

    assert_eq!(response.status_code(), 401);
    assert_eq!(app.state.photos.cached_entries(), 1);
}

#[tokio::test]
async fn test_missing_signature_is_unauthorized() {
    let app = setup_test_app();

    let response = app
        .client()
        .post(&api_path(WEBHOOK))
        .bytes(Bytes::from(notification("photos/alice/game-1/a")))
        .await;

    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn test_unsigned_notification_accepted_without_secret() {
    let app = setup_test_app_with(|config| config.webhook_secret = None);

    let response = app
        .client()
        .post(&api_path(WEBHOOK))
        .bytes(Bytes::from(notification("photos/alice/game-1/a")))
        .await;

    assert_eq!(response.status_code(), 200);
    let ack: Value = response.json();
    assert_eq!(ack["verified"], false);
}

#[tokio::test]
async fn test_malformed_payload_is_bad_request() {
    let app = setup_test_app_with(|config| config.webhook_secret = None);

    let response = app
        .client()
        .post(&api_path(WEBHOOK))
        .bytes(Bytes::from_static(b"not json"))
        .await;

    assert_eq!(response.status_code(), 400);
}
