use crate::store::{
    CampaignFilter, CampaignMessageRow, CampaignRow, ContactFilter, ContactRow,
    MpesaCallbackUpdate, MpesaTransactionRow, ServiceActivationRow, ServiceRow, Store,
    UssdMenuRow, UssdSessionLogFilter, UssdSessionLogRow, WebhookEndpointRow,
};
use tempfile::TempDir;

async fn setup() -> (TempDir, Store) {
    sambaza_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let store = Store::new(&format!("sqlite://{}/test.db?mode=rwc", dir.path().display()), dir.path()).await.unwrap();
    (dir, store)
}

fn contact(user_id: &str, phone: &str, group: Option<&str>) -> ContactRow {
    ContactRow {
        id: sambaza_common::id::next_id(),
        user_id: user_id.to_string(),
        phone: phone.to_string(),
        name: None,
        email: None,
        group_name: group.map(str::to_string),
        opted_out: false,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    }
}

fn campaign(user_id: &str) -> CampaignRow {
    CampaignRow {
        id: sambaza_common::id::next_id(),
        user_id: user_id.to_string(),
        name: "March promo".to_string(),
        message_type: "sms".to_string(),
        sender_id: Some("SAMBAZA".to_string()),
        body: "Hello {name}".to_string(),
        status: "draft".to_string(),
        recipient_count: 0,
        sent_count: 0,
        delivered_count: 0,
        failed_count: 0,
        cost: 0.0,
        scheduled_at: None,
        started_at: None,
        completed_at: None,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn create_and_look_up_user() {
    let (_dir, store) = setup().await;

    assert_eq!(store.count_users().await.unwrap(), 0);
    let id = store.create_user("admin", "hash").await.unwrap();
    assert_eq!(store.count_users().await.unwrap(), 1);

    let user = store.get_user_by_username("admin").await.unwrap().unwrap();
    assert_eq!(user.id, id);
    assert_eq!(user.token_version, 0);
    assert!(store.get_user_by_username("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn password_change_bumps_token_version() {
    let (_dir, store) = setup().await;
    let id = store.create_user("admin", "hash-1").await.unwrap();

    assert!(store
        .update_user_password_hash(&id, "hash-2")
        .await
        .unwrap());
    let user = store.get_user_by_id(&id).await.unwrap().unwrap();
    assert_eq!(user.password_hash, "hash-2");
    assert_eq!(user.token_version, 1);
}

#[tokio::test]
async fn contacts_are_scoped_to_owner() {
    let (_dir, store) = setup().await;

    let a = store.insert_contact(&contact("user-a", "+254700000001", None)).await.unwrap();
    store.insert_contact(&contact("user-b", "+254700000002", None)).await.unwrap();

    let filter = ContactFilter::default();
    let listed = store.list_contacts("user-a", &filter, 20, 0).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].phone, "+254700000001");

    // Cross-tenant get/delete must miss
    assert!(store.get_contact("user-b", &a.id).await.unwrap().is_none());
    assert!(!store.delete_contact("user-b", &a.id).await.unwrap());
    assert!(store.delete_contact("user-a", &a.id).await.unwrap());
}

#[tokio::test]
async fn campaign_recipients_exclude_opted_out() {
    let (_dir, store) = setup().await;

    store.insert_contact(&contact("u1", "+254700000001", Some("vip"))).await.unwrap();
    let mut opted = contact("u1", "+254700000002", Some("vip"));
    opted.opted_out = true;
    store.insert_contact(&opted).await.unwrap();
    store.insert_contact(&contact("u1", "+254700000003", Some("other"))).await.unwrap();

    let vip = store.list_campaign_recipients("u1", Some("vip")).await.unwrap();
    assert_eq!(vip.len(), 1);
    assert_eq!(vip[0].phone, "+254700000001");

    let all = store.list_campaign_recipients("u1", None).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn delivery_counts_aggregate_message_rows() {
    let (_dir, store) = setup().await;

    let c = store.insert_campaign(&campaign("u1")).await.unwrap();
    for (phone, status, cost) in [
        ("+254700000001", "sent", 0.8),
        ("+254700000002", "delivered", 0.8),
        ("+254700000003", "failed", 0.0),
    ] {
        let msg = CampaignMessageRow {
            id: sambaza_common::id::next_id(),
            campaign_id: c.id.clone(),
            user_id: "u1".to_string(),
            phone: phone.to_string(),
            gateway_message_id: None,
            status: status.to_string(),
            failure_reason: None,
            cost,
            network_code: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        store.insert_campaign_message(&msg).await.unwrap();
    }

    let counts = store.campaign_delivery_counts(&c.id).await.unwrap();
    assert_eq!(counts.total, 3);
    assert_eq!(counts.sent, 1);
    assert_eq!(counts.delivered, 1);
    assert_eq!(counts.failed, 1);
    assert!(!counts.is_settled());
    assert!((counts.cost - 1.6).abs() < 1e-9);

    store.overwrite_campaign_counters(&c.id, &counts).await.unwrap();
    let reloaded = store.get_campaign("u1", &c.id).await.unwrap().unwrap();
    assert_eq!(reloaded.recipient_count, 3);
    assert_eq!(reloaded.sent_count, 2); // sent + delivered
    assert_eq!(reloaded.delivered_count, 1);
    assert_eq!(reloaded.failed_count, 1);
}

#[tokio::test]
async fn delivery_report_updates_message_by_gateway_id() {
    let (_dir, store) = setup().await;

    let c = store.insert_campaign(&campaign("u1")).await.unwrap();
    let msg = CampaignMessageRow {
        id: sambaza_common::id::next_id(),
        campaign_id: c.id.clone(),
        user_id: "u1".to_string(),
        phone: "+254700000001".to_string(),
        gateway_message_id: None,
        status: "queued".to_string(),
        failure_reason: None,
        cost: 0.0,
        network_code: None,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    let msg = store.insert_campaign_message(&msg).await.unwrap();
    store.mark_message_sent(&msg.id, "ATXid_123", 0.8).await.unwrap();

    let hit = store
        .update_message_by_gateway_id("ATXid_123", "delivered", None, Some("63902"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit.status, "delivered");
    assert_eq!(hit.network_code.as_deref(), Some("63902"));

    let miss = store
        .update_message_by_gateway_id("ATXid_unknown", "delivered", None, None)
        .await
        .unwrap();
    assert!(miss.is_none());
}

#[tokio::test]
async fn campaign_list_filters_by_status() {
    let (_dir, store) = setup().await;

    let c1 = store.insert_campaign(&campaign("u1")).await.unwrap();
    store.insert_campaign(&campaign("u1")).await.unwrap();
    store
        .set_campaign_status(&c1.id, "sending", Some(chrono::Utc::now()), None)
        .await
        .unwrap();

    let filter = CampaignFilter {
        status_eq: Some("sending".to_string()),
        ..Default::default()
    };
    let sending = store.list_campaigns("u1", &filter, 20, 0).await.unwrap();
    assert_eq!(sending.len(), 1);
    assert_eq!(sending[0].id, c1.id);

    let by_status = store.list_campaigns_by_status("sending").await.unwrap();
    assert_eq!(by_status.len(), 1);
}

#[tokio::test]
async fn webhook_endpoint_round_trips_events_and_secret() {
    let (_dir, store) = setup().await;

    let secret = "whsec_abc123";
    let encrypted = store.secret_encryptor().encrypt(secret).unwrap();
    let row = WebhookEndpointRow {
        id: sambaza_common::id::next_id(),
        user_id: "u1".to_string(),
        url: "https://example.com/hooks".to_string(),
        description: None,
        encrypted_secret: encrypted,
        events: vec!["campaign.completed".to_string()],
        enabled: true,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    let inserted = store.insert_webhook_endpoint(&row).await.unwrap();
    assert!(inserted.subscribes_to("campaign.completed"));
    assert!(!inserted.subscribes_to("payment.completed"));

    let loaded = store
        .get_webhook_endpoint("u1", &inserted.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.events, vec!["campaign.completed"]);
    let decrypted = store
        .secret_encryptor()
        .decrypt(&loaded.encrypted_secret)
        .unwrap();
    assert_eq!(decrypted, secret);
}

#[tokio::test]
async fn mpesa_callback_updates_by_checkout_request_id() {
    let (_dir, store) = setup().await;

    let row = MpesaTransactionRow {
        id: sambaza_common::id::next_id(),
        user_id: "u1".to_string(),
        phone: "+254700000001".to_string(),
        amount: 150.0,
        account_reference: Some("INV-42".to_string()),
        description: None,
        merchant_request_id: Some("mr-1".to_string()),
        checkout_request_id: Some("ws_CO_1".to_string()),
        status: "pending".to_string(),
        result_code: None,
        result_desc: None,
        mpesa_receipt: None,
        transaction_date: None,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    store.insert_mpesa_transaction(&row).await.unwrap();

    let upd = MpesaCallbackUpdate {
        status: "completed".to_string(),
        result_code: 0,
        result_desc: "Success".to_string(),
        mpesa_receipt: Some("QGR7XYZ".to_string()),
        transaction_date: Some("20250301101530".to_string()),
    };
    let hit = store.apply_mpesa_callback("ws_CO_1", &upd).await.unwrap().unwrap();
    assert_eq!(hit.status, "completed");
    assert_eq!(hit.mpesa_receipt.as_deref(), Some("QGR7XYZ"));

    assert!(store
        .apply_mpesa_callback("ws_CO_unknown", &upd)
        .await
        .unwrap()
        .is_none());
    let total = store.sum_completed_mpesa_amount("u1").await.unwrap();
    assert!((total - 150.0).abs() < 1e-9);
}

#[tokio::test]
async fn ussd_menu_lookup_and_session_logs() {
    let (_dir, store) = setup().await;

    let menu = UssdMenuRow {
        id: sambaza_common::id::next_id(),
        user_id: "u1".to_string(),
        service_code: "*384*42#".to_string(),
        name: "Main menu".to_string(),
        menu_json: "{}".to_string(),
        survey_id: None,
        enabled: true,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    store.insert_ussd_menu(&menu).await.unwrap();

    let found = store
        .get_ussd_menu_by_service_code("*384*42#")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.name, "Main menu");

    for (input, terminal) in [("", false), ("1", true)] {
        let log = UssdSessionLogRow {
            id: sambaza_common::id::next_id(),
            session_id: "sess-1".to_string(),
            service_code: "*384*42#".to_string(),
            phone: "+254700000001".to_string(),
            input_text: input.to_string(),
            response_text: "CON Hello".to_string(),
            screen: "root".to_string(),
            terminal,
            created_at: chrono::Utc::now(),
        };
        store.insert_ussd_session_log(&log).await.unwrap();
    }

    let filter = UssdSessionLogFilter {
        session_id_eq: Some("sess-1".to_string()),
        ..Default::default()
    };
    assert_eq!(
        store
            .count_ussd_session_logs("*384*42#", &filter)
            .await
            .unwrap(),
        2
    );
    let terminal_only = UssdSessionLogFilter {
        terminal_eq: Some(true),
        ..Default::default()
    };
    assert_eq!(
        store
            .count_ussd_session_logs("*384*42#", &terminal_only)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn api_key_prefix_lookup_only_returns_enabled() {
    let (_dir, store) = setup().await;

    let key = crate::auth::generate_api_key();
    let prefix = crate::auth::api_key_prefix(&key);
    let row = crate::store::ApiKeyRow {
        id: sambaza_common::id::next_id(),
        user_id: "u1".to_string(),
        name: "ci".to_string(),
        key_prefix: prefix.clone(),
        key_hash: crate::auth::hash_token(&key).unwrap(),
        encrypted_key: None,
        enabled: true,
        last_used_at: None,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    let inserted = store.insert_api_key(&row).await.unwrap();

    let hits = store.list_enabled_api_keys_by_prefix(&prefix).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(crate::auth::verify_token(&key, &hits[0].key_hash).unwrap());

    store
        .set_api_key_enabled("u1", &inserted.id, false)
        .await
        .unwrap();
    assert!(store
        .list_enabled_api_keys_by_prefix(&prefix)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn activation_status_transition_sets_activated_at_once() {
    let (_dir, store) = setup().await;

    let svc = ServiceRow {
        id: sambaza_common::id::next_id(),
        code: "sms".to_string(),
        name: "Bulk SMS".to_string(),
        description: None,
        enabled: true,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    let svc = store.insert_service(&svc).await.unwrap();

    let act = ServiceActivationRow {
        id: sambaza_common::id::next_id(),
        user_id: "u1".to_string(),
        service_id: svc.id.clone(),
        status: "pending".to_string(),
        activated_at: None,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    let act = store.insert_activation(&act).await.unwrap();
    assert!(act.activated_at.is_none());

    let active = store
        .update_activation_status("u1", &act.id, "active")
        .await
        .unwrap()
        .unwrap();
    let first_activated = active.activated_at.unwrap();

    let suspended = store
        .update_activation_status("u1", &act.id, "suspended")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(suspended.activated_at.unwrap(), first_activated);
}
