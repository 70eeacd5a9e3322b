mod common;

use axum::http::StatusCode;
use common::{build_test_context, login_and_get_token, request_form, request_json, request_no_body};
use serde_json::json;

#[tokio::test]
async fn ussd_callback_walks_menu_and_logs_sessions() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    let menu = json!({
        "screens": {
            "root": {
                "text": "Welcome\n1. Balance\n2. Offers",
                "options": {"1": "end:Balance is KES 10", "2": "screen:offers"}
            },
            "offers": {
                "text": "Offers\n1. Daily bundle",
                "options": {"1": "end:Bundle activated"}
            }
        }
    });
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/ussd/menus",
        Some(&token),
        Some(json!({"service_code": "*384*42#", "name": "Main", "menu": menu})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let menu_id = body["data"]["id"].as_str().unwrap().to_string();

    // First hit: empty text renders the root screen as CON
    let (status, reply) = request_form(
        &ctx.app,
        "/v1/callbacks/ussd",
        "sessionId=sess-1&serviceCode=%2A384%2A42%23&phoneNumber=%2B254711000001&text=",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(reply.starts_with("CON Welcome"), "got: {reply}");

    // Nested screen
    let (status, reply) = request_form(
        &ctx.app,
        "/v1/callbacks/ussd",
        "sessionId=sess-1&serviceCode=%2A384%2A42%23&phoneNumber=%2B254711000001&text=2",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(reply.starts_with("CON Offers"), "got: {reply}");

    // Terminal option
    let (status, reply) = request_form(
        &ctx.app,
        "/v1/callbacks/ussd",
        "sessionId=sess-1&serviceCode=%2A384%2A42%23&phoneNumber=%2B254711000001&text=2*1",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, "END Bundle activated");

    // Invalid option replays the current screen
    let (status, reply) = request_form(
        &ctx.app,
        "/v1/callbacks/ussd",
        "sessionId=sess-1&serviceCode=%2A384%2A42%23&phoneNumber=%2B254711000001&text=9",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(reply.starts_with("CON Invalid choice."), "got: {reply}");

    // Unknown service code ends politely
    let (status, reply) = request_form(
        &ctx.app,
        "/v1/callbacks/ussd",
        "sessionId=sess-2&serviceCode=%2A999%23&phoneNumber=%2B254711000001&text=",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, "END Service not available");

    // Every hit (including the invalid one) produced a session log row
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/ussd/menus/{menu_id}/sessions?session_id__eq=sess-1"),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 4);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/ussd/menus/{menu_id}/sessions?terminal__eq=true"),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn ussd_terminal_hit_records_survey_response() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    let (_, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/surveys",
        Some(&token),
        Some(json!({
            "title": "Network quality",
            "questions": [{"id": "q1", "text": "Rate us", "options": ["Good", "Bad"]}]
        })),
    )
    .await;
    let survey_id = body["data"]["id"].as_str().unwrap().to_string();

    let menu = json!({
        "screens": {
            "root": {
                "text": "Rate us\n1. Good\n2. Bad",
                "options": {"1": "end:Thank you", "2": "end:Thank you"}
            }
        }
    });
    request_json(
        &ctx.app,
        "POST",
        "/v1/ussd/menus",
        Some(&token),
        Some(json!({
            "service_code": "*384*7#",
            "name": "Rating",
            "menu": menu,
            "survey_id": survey_id
        })),
    )
    .await;

    let (status, reply) = request_form(
        &ctx.app,
        "/v1/callbacks/ussd",
        "sessionId=sess-9&serviceCode=%2A384%2A7%23&phoneNumber=%2B254711000009&text=1",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, "END Thank you");

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/surveys/{survey_id}/responses"),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    let answers: serde_json::Value = serde_json::from_str(
        body["data"]["items"][0]["answers_json"].as_str().unwrap(),
    )
    .unwrap();
    assert_eq!(answers["path"], json!(["1"]));

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/surveys/{survey_id}/stats"),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["response_count"], 1);
}

#[tokio::test]
async fn mpesa_callback_completes_pending_transaction() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    // Pending row as the STK push handler would have inserted it
    let admin = ctx
        .state
        .store
        .get_user_by_username("admin")
        .await
        .unwrap()
        .unwrap();
    let tx = sambaza_storage::store::MpesaTransactionRow {
        id: sambaza_common::id::next_id(),
        user_id: admin.id.clone(),
        phone: "254711000001".to_string(),
        amount: 150.0,
        account_reference: Some("INV-42".to_string()),
        description: Some("Payment".to_string()),
        merchant_request_id: Some("mr-1".to_string()),
        checkout_request_id: Some("ws_CO_777".to_string()),
        status: "pending".to_string(),
        result_code: None,
        result_desc: None,
        mpesa_receipt: None,
        transaction_date: None,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    ctx.state.store.insert_mpesa_transaction(&tx).await.unwrap();

    let callback = json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "mr-1",
                "CheckoutRequestID": "ws_CO_777",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        {"Name": "Amount", "Value": 150.0},
                        {"Name": "MpesaReceiptNumber", "Value": "QGR7XYZ12"},
                        {"Name": "TransactionDate", "Value": 20250301101530i64},
                        {"Name": "PhoneNumber", "Value": 254711000001i64}
                    ]
                }
            }
        }
    });
    let (status, body, _) =
        request_json(&ctx.app, "POST", "/v1/callbacks/mpesa", None, Some(callback)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ResultCode"], 0);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/payments/transactions/{}", tx.id),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["mpesa_receipt"], "QGR7XYZ12");
    assert_eq!(body["data"]["result_code"], 0);

    // Unknown checkout id still answers ResultCode 0 (no retry storm)
    let unknown = json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "mr-2",
                "CheckoutRequestID": "ws_CO_unknown",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }
        }
    });
    let (status, body, _) =
        request_json(&ctx.app, "POST", "/v1/callbacks/mpesa", None, Some(unknown)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ResultCode"], 0);
}

#[tokio::test]
async fn delivery_report_updates_messages_and_completes_campaign() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    let admin = ctx
        .state
        .store
        .get_user_by_username("admin")
        .await
        .unwrap()
        .unwrap();

    // A sending campaign with two sent messages, as the batch sender leaves them
    let campaign = sambaza_storage::store::CampaignRow {
        id: sambaza_common::id::next_id(),
        user_id: admin.id.clone(),
        name: "Promo".to_string(),
        message_type: "sms".to_string(),
        sender_id: None,
        body: "Hi".to_string(),
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
    };
    let campaign = ctx.state.store.insert_campaign(&campaign).await.unwrap();
    ctx.state
        .store
        .set_campaign_status(&campaign.id, "sending", Some(chrono::Utc::now()), None)
        .await
        .unwrap();

    for (phone, gateway_id) in [("+254711000001", "ATXid_1"), ("+254711000002", "ATXid_2")] {
        let msg = sambaza_storage::store::CampaignMessageRow {
            id: sambaza_common::id::next_id(),
            campaign_id: campaign.id.clone(),
            user_id: admin.id.clone(),
            phone: phone.to_string(),
            gateway_message_id: None,
            status: "queued".to_string(),
            failure_reason: None,
            cost: 0.0,
            network_code: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let msg = ctx.state.store.insert_campaign_message(&msg).await.unwrap();
        ctx.state
            .store
            .mark_message_sent(&msg.id, gateway_id, 0.8)
            .await
            .unwrap();
    }

    // First report: one delivered, campaign still sending
    let (status, _) = request_form(
        &ctx.app,
        "/v1/callbacks/delivery",
        "id=ATXid_1&status=Success&phoneNumber=%2B254711000001&networkCode=63902",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let reloaded = ctx
        .state
        .store
        .get_campaign(&admin.id, &campaign.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.status, "sending");
    assert_eq!(reloaded.delivered_count, 1);

    // Second report fails the other message: all terminal, campaign completes
    let (status, _) = request_form(
        &ctx.app,
        "/v1/callbacks/delivery",
        "id=ATXid_2&status=Failed&phoneNumber=%2B254711000002&failureReason=AbsentSubscriber",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let reloaded = ctx
        .state
        .store
        .get_campaign(&admin.id, &campaign.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.status, "completed");
    assert_eq!(reloaded.delivered_count, 1);
    assert_eq!(reloaded.failed_count, 1);
    assert!(reloaded.completed_at.is_some());

    // Campaign message list reflects the reports
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/campaigns/{}/messages?status__eq=failed", campaign.id),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(
        body["data"]["items"][0]["failure_reason"],
        "AbsentSubscriber"
    );

    // Reports for unknown gateway ids are ignored quietly
    let (status, _) = request_form(
        &ctx.app,
        "/v1/callbacks/delivery",
        "id=ATXid_unknown&status=Success&phoneNumber=%2B254711000003",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
