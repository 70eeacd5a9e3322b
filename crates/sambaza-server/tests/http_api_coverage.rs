mod common;

use axum::http::StatusCode;
use common::{
    assert_err_envelope, assert_ok_envelope, build_test_context, login_and_get_token, request_json,
    request_no_body,
};
use serde_json::json;

#[tokio::test]
async fn health_should_return_ok_envelope() {
    let ctx = build_test_context().await.expect("test context should build");
    let (status, body, trace) = request_no_body(&ctx.app, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert!(body["data"]["version"].is_string());
    assert_eq!(body["data"]["storage_status"], "ok");
    assert!(trace.is_some());
}

#[tokio::test]
async fn auth_login_success_and_failure_cases() {
    let ctx = build_test_context().await.expect("test context should build");

    let token = login_and_get_token(&ctx).await;
    assert!(!token.is_empty());

    // Wrong password
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/login",
        None,
        Some(json!({"username": "admin", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1002);

    // Empty fields
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/login",
        None,
        Some(json!({"username": "", "password": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);
}

#[tokio::test]
async fn protected_routes_require_token() {
    let ctx = build_test_context().await.expect("test context should build");

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/campaigns", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1002);

    let (status, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/campaigns", Some("garbage-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1002);
}

#[tokio::test]
async fn change_password_flow() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    // Wrong current password
    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/change-password",
        Some(&token),
        Some(json!({"current_password": "nope", "new_password": "longenough1"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Too-short new password
    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/change-password",
        Some(&token),
        Some(json!({"current_password": "changeme", "new_password": "short"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Success, then login with the new password
    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/change-password",
        Some(&token),
        Some(json!({"current_password": "changeme", "new_password": "longenough1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/login",
        None,
        Some(json!({"username": "admin", "password": "longenough1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn campaign_crud_lifecycle() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    // Create
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/campaigns",
        Some(&token),
        Some(json!({"name": "Promo", "body": "Hello!", "sender_id": "SAMBAZA"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ok_envelope(&body);
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "draft");

    // Unknown message type is rejected
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/campaigns",
        Some(&token),
        Some(json!({"name": "Bad", "body": "x", "message_type": "fax"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);

    // List with status filter
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/campaigns?status__eq=draft",
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);

    // Get + update
    let (status, _, _) =
        request_no_body(&ctx.app, "GET", &format!("/v1/campaigns/{id}"), Some(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/campaigns/{id}"),
        Some(&token),
        Some(json!({"body": "Hello again!"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["body"], "Hello again!");

    // Send without a configured gateway answers 503
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        &format!("/v1/campaigns/{id}/send"),
        Some(&token),
        Some(json!({"recipients": ["+254711000001"]})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_err_envelope(&body, 1201);

    // Delivery stats exist (empty)
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/campaigns/{id}/delivery"),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 0);

    // Delete (still draft)
    let (status, _, _) = request_json(
        &ctx.app,
        "DELETE",
        &format!("/v1/campaigns/{id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) =
        request_no_body(&ctx.app, "GET", &format!("/v1/campaigns/{id}"), Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn contact_crud_and_import() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/contacts",
        Some(&token),
        Some(json!({"phone": "+254711000001", "name": "Asha", "group_name": "vip"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    // Duplicate phone conflicts
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/contacts",
        Some(&token),
        Some(json!({"phone": "+254711000001"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_err_envelope(&body, 1005);

    // Invalid phone rejected
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/contacts",
        Some(&token),
        Some(json!({"phone": "abc"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1105);

    // Import skips invalid and duplicate rows
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/contacts/import",
        Some(&token),
        Some(json!({"contacts": [
            {"phone": "+254711000001"},
            {"phone": "+254711000002", "group_name": "vip"},
            {"phone": "bad"}
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["imported"], 1);
    assert_eq!(body["data"]["skipped"], 2);

    // Filter by group
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/contacts?group_name__eq=vip",
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);

    // Opt out, then delete
    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/contacts/{id}"),
        Some(&token),
        Some(json!({"opted_out": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["opted_out"], true);

    let (status, _, _) = request_json(
        &ctx.app,
        "DELETE",
        &format!("/v1/contacts/{id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn service_catalog_and_activation_toggle() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/services", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let services = body["data"].as_array().unwrap();
    assert!(services.iter().any(|s| s["code"] == "sms"));
    assert!(services.iter().all(|s| s["activation"].is_null()));

    // Activate
    let (status, body, _) =
        request_json(&ctx.app, "POST", "/v1/services/sms/activate", Some(&token), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let activation_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "active");

    // Re-activating returns the existing row
    let (status, body, _) =
        request_json(&ctx.app, "POST", "/v1/services/sms/activate", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"].as_str().unwrap(), activation_id);

    // Suspend
    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/services/activations/{activation_id}"),
        Some(&token),
        Some(json!({"status": "suspended"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "suspended");

    // Unknown status rejected
    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/services/activations/{activation_id}"),
        Some(&token),
        Some(json!({"status": "paused"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1101);

    // Unknown service 404s
    let (status, _, _) =
        request_json(&ctx.app, "POST", "/v1/services/fax/activate", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_key_lifecycle_and_messaging_auth() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/apikeys",
        Some(&token),
        Some(json!({"name": "ci"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let key = body["data"]["key"].as_str().unwrap().to_string();
    let key_id = body["data"]["id"].as_str().unwrap().to_string();
    assert!(key.starts_with("sbz_"));

    // List never exposes the key, only the prefix
    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/apikeys", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0]["key"].is_null());
    assert!(items[0]["key_hash"].is_null());
    assert_eq!(items[0]["key_prefix"].as_str().unwrap().len(), 12);

    // A valid key passes messaging auth; the 503 proves we got past it
    // (no SMS gateway is configured in tests).
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/v1/messaging/send")
        .header("Content-Type", "application/json")
        .header("X-Api-Key", &key)
        .body(axum::body::Body::from(
            json!({"to": ["+254711000001"], "message": "hi"}).to_string(),
        ))
        .unwrap();
    let response = tower::util::ServiceExt::oneshot(ctx.app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // A bogus key is rejected before the handler
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/v1/messaging/send")
        .header("Content-Type", "application/json")
        .header("X-Api-Key", "sbz_bogus00000000000000")
        .body(axum::body::Body::from(
            json!({"to": ["+254711000001"], "message": "hi"}).to_string(),
        ))
        .unwrap();
    let response = tower::util::ServiceExt::oneshot(ctx.app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Disable the key: it stops authenticating
    let (status, _, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/apikeys/{key_id}"),
        Some(&token),
        Some(json!({"enabled": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/v1/messaging/send")
        .header("Content-Type", "application/json")
        .header("X-Api-Key", &key)
        .body(axum::body::Body::from(
            json!({"to": ["+254711000001"], "message": "hi"}).to_string(),
        ))
        .unwrap();
    let response = tower::util::ServiceExt::oneshot(ctx.app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Delete
    let (status, _, _) = request_json(
        &ctx.app,
        "DELETE",
        &format!("/v1/apikeys/{key_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn messaging_routes_accept_jwt_and_report_missing_gateway() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    let (status, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/messaging/balance", Some(&token)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_err_envelope(&body, 1201);

    let (status, _, _) = request_no_body(&ctx.app, "GET", "/v1/messaging/balance", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_endpoint_crud() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/webhooks",
        Some(&token),
        Some(json!({
            "url": "https://example.com/hooks",
            "events": ["campaign.completed"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert!(body["data"]["secret"].as_str().unwrap().starts_with("whsec_"));

    // Bad URL rejected
    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/webhooks",
        Some(&token),
        Some(json!({"url": "ftp://example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // List hides the secret
    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/webhooks", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0]["encrypted_secret"].is_null());
    assert!(items[0]["secret"].is_null());

    // Update subscription list
    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/webhooks/{id}"),
        Some(&token),
        Some(json!({"events": ["payment.completed"], "enabled": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["enabled"], false);

    // Deliveries list is empty
    let (status, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/webhooks/deliveries", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 0);

    let (status, _, _) = request_json(
        &ctx.app,
        "DELETE",
        &format!("/v1/webhooks/{id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn survey_crud_and_stats() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    // Duplicate question ids rejected
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/surveys",
        Some(&token),
        Some(json!({
            "title": "Bad",
            "questions": [
                {"id": "q1", "text": "a"},
                {"id": "q1", "text": "b"}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1104);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/surveys",
        Some(&token),
        Some(json!({
            "title": "Service feedback",
            "channel": "ussd",
            "questions": [{"id": "q1", "text": "Happy?", "options": ["Yes", "No"]}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    // Stats over zero responses
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/surveys/{id}/stats"),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["response_count"], 0);

    let (status, _, _) = request_json(
        &ctx.app,
        "DELETE",
        &format!("/v1/surveys/{id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn ticket_crud_and_status_validation() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/tickets",
        Some(&token),
        Some(json!({"subject": "SMS not delivered", "description": "Campaign 42 stuck"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "open");

    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/tickets/{id}"),
        Some(&token),
        Some(json!({"status": "in_progress", "assignee": "support-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "in_progress");

    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/tickets/{id}"),
        Some(&token),
        Some(json!({"status": "finished"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1101);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/tickets?status__eq=in_progress",
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn audit_logs_record_mutations() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    let (_, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/contacts",
        Some(&token),
        Some(json!({"phone": "+254711000001"})),
    )
    .await;
    let contact_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/audit-logs?action__eq=contact.create",
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(
        body["data"]["items"][0]["resource_id"].as_str().unwrap(),
        contact_id
    );
}

#[tokio::test]
async fn dashboard_overview_aggregates_counts() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    request_json(
        &ctx.app,
        "POST",
        "/v1/contacts",
        Some(&token),
        Some(json!({"phone": "+254711000001"})),
    )
    .await;
    request_json(
        &ctx.app,
        "POST",
        "/v1/campaigns",
        Some(&token),
        Some(json!({"name": "Promo", "body": "Hi"})),
    )
    .await;
    request_json(&ctx.app, "POST", "/v1/services/sms/activate", Some(&token), None).await;

    let (status, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/dashboard/overview", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["contact_count"], 1);
    assert_eq!(body["data"]["campaign_count"], 1);
    assert_eq!(body["data"]["active_service_count"], 1);
    assert_eq!(body["data"]["open_ticket_count"], 0);
}

#[tokio::test]
async fn ussd_menu_crud_and_validation() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    // Menu without a root screen is rejected
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/ussd/menus",
        Some(&token),
        Some(json!({
            "service_code": "*384*1#",
            "name": "Broken",
            "menu": {"screens": {"home": {"text": "hi"}}}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1103);

    let menu = json!({
        "screens": {
            "root": {
                "text": "Welcome\n1. Balance\n2. Bye",
                "options": {"1": "end:Balance is KES 10", "2": "end:Bye"}
            }
        }
    });
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/ussd/menus",
        Some(&token),
        Some(json!({"service_code": "*384*1#", "name": "Main", "menu": menu.clone()})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    // Duplicate service code conflicts
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/ussd/menus",
        Some(&token),
        Some(json!({"service_code": "*384*1#", "name": "Dup", "menu": menu})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_err_envelope(&body, 1005);

    let (status, _, _) = request_json(
        &ctx.app,
        "DELETE",
        &format!("/v1/ussd/menus/{id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn payments_require_configured_gateway() {
    let ctx = build_test_context().await.expect("test context should build");
    let token = login_and_get_token(&ctx).await;

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/payments/stkpush",
        Some(&token),
        Some(json!({"phone": "254711000001", "amount": 100.0})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_err_envelope(&body, 1201);

    let (status, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/payments/transactions", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 0);
}
