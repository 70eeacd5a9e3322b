use crate::dispatcher::WebhookDispatcher;
use crate::{events, WebhookEvent};
use sambaza_storage::Store;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn event_body_carries_type_and_data() {
    let event = WebhookEvent::new(
        events::CAMPAIGN_COMPLETED,
        serde_json::json!({"campaign_id": "c-1", "delivered": 10}),
    );
    let body: serde_json::Value = serde_json::from_str(&event.body()).unwrap();
    assert_eq!(body["event"], "campaign.completed");
    assert_eq!(body["data"]["campaign_id"], "c-1");
    assert!(body["occurred_at"].as_str().is_some());
}

#[test]
fn test_ping_event_uses_ping_type() {
    let event = WebhookEvent::test_ping();
    assert_eq!(event.event_type, events::TEST_PING);
}

#[tokio::test]
async fn dispatch_with_no_endpoints_is_a_noop() {
    sambaza_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let store = Arc::new(Store::new(&format!("sqlite://{}/test.db?mode=rwc", dir.path().display()), dir.path()).await.unwrap());
    let dispatcher = WebhookDispatcher::new(store);

    let event = WebhookEvent::new(events::PAYMENT_COMPLETED, serde_json::json!({}));
    let delivered = dispatcher.dispatch("u1", &event).await.unwrap();
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn dispatch_skips_endpoints_not_subscribed() {
    sambaza_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let store = Arc::new(Store::new(&format!("sqlite://{}/test.db?mode=rwc", dir.path().display()), dir.path()).await.unwrap());

    let encrypted = store.secret_encryptor().encrypt("whsec_1").unwrap();
    let endpoint = sambaza_storage::store::WebhookEndpointRow {
        id: sambaza_common::id::next_id(),
        user_id: "u1".to_string(),
        url: "http://127.0.0.1:9/unreachable".to_string(),
        description: None,
        encrypted_secret: encrypted,
        events: vec![events::CAMPAIGN_COMPLETED.to_string()],
        enabled: true,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    store.insert_webhook_endpoint(&endpoint).await.unwrap();

    let dispatcher = WebhookDispatcher::new(store.clone());
    // Different event type: the endpoint is filtered out, nothing is logged.
    let event = WebhookEvent::new(events::PAYMENT_COMPLETED, serde_json::json!({}));
    let delivered = dispatcher.dispatch("u1", &event).await.unwrap();
    assert_eq!(delivered, 0);
    let logs = store
        .list_webhook_deliveries(
            "u1",
            &sambaza_storage::store::WebhookDeliveryFilter::default(),
            20,
            0,
        )
        .await
        .unwrap();
    assert!(logs.is_empty());
}

#[tokio::test]
async fn failed_delivery_is_logged() {
    sambaza_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let store = Arc::new(Store::new(&format!("sqlite://{}/test.db?mode=rwc", dir.path().display()), dir.path()).await.unwrap());

    let encrypted = store.secret_encryptor().encrypt("whsec_1").unwrap();
    let endpoint = sambaza_storage::store::WebhookEndpointRow {
        id: sambaza_common::id::next_id(),
        user_id: "u1".to_string(),
        // Port 9 (discard) is not listening; connection is refused fast.
        url: "http://127.0.0.1:9/hook".to_string(),
        description: None,
        encrypted_secret: encrypted,
        events: vec![],
        enabled: true,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    store.insert_webhook_endpoint(&endpoint).await.unwrap();

    let dispatcher = WebhookDispatcher::new(store.clone());
    let event = WebhookEvent::new(events::CAMPAIGN_COMPLETED, serde_json::json!({"id": "c-1"}));
    let delivered = dispatcher.dispatch("u1", &event).await.unwrap();
    assert_eq!(delivered, 0);

    let logs = store
        .list_webhook_deliveries(
            "u1",
            &sambaza_storage::store::WebhookDeliveryFilter::default(),
            20,
            0,
        )
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, "failed");
    assert_eq!(logs[0].event_type, "campaign.completed");
    assert!(logs[0].error_message.is_some());
    assert!(logs[0].request_body.as_ref().unwrap().contains("c-1"));
}
