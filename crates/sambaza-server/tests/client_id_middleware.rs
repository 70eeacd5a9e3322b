mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::build_test_context_with;
use sambaza_server::config::ClientIdConfig;
use tower::util::ServiceExt;

async fn get_health(app: &axum::Router, client_id: Option<&str>) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().uri("/v1/health");
    if let Some(id) = client_id {
        builder = builder.header("sbz-client-id", id);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

#[tokio::test]
async fn feature_disabled_passes_through() {
    let ctx = build_test_context_with(ClientIdConfig {
        require_client_id: false,
        allowed_client_ids: vec![],
    })
    .await
    .unwrap();

    let (status, _) = get_health(&ctx.app, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_header_returns_403() {
    let ctx = build_test_context_with(ClientIdConfig {
        require_client_id: true,
        allowed_client_ids: vec![],
    })
    .await
    .unwrap();

    let (status, body) = get_health(&ctx.app, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["err_code"], 1008);
}

#[tokio::test]
async fn empty_header_returns_403() {
    let ctx = build_test_context_with(ClientIdConfig {
        require_client_id: true,
        allowed_client_ids: vec![],
    })
    .await
    .unwrap();

    let (status, body) = get_health(&ctx.app, Some("")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["err_code"], 1008);
}

#[tokio::test]
async fn any_value_passes_when_allowlist_empty() {
    let ctx = build_test_context_with(ClientIdConfig {
        require_client_id: true,
        allowed_client_ids: vec![],
    })
    .await
    .unwrap();

    let (status, _) = get_health(&ctx.app, Some("any-console")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn allowlist_is_enforced() {
    let ctx = build_test_context_with(ClientIdConfig {
        require_client_id: true,
        allowed_client_ids: vec!["web-console".to_string(), "mobile-app".to_string()],
    })
    .await
    .unwrap();

    let (status, _) = get_health(&ctx.app, Some("web-console")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get_health(&ctx.app, Some("unknown-app")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["err_code"], 1009);
}

#[tokio::test]
async fn callbacks_bypass_client_id_gate() {
    let ctx = build_test_context_with(ClientIdConfig {
        require_client_id: true,
        allowed_client_ids: vec!["web-console".to_string()],
    })
    .await
    .unwrap();

    // The gateway never sends sbz-client-id; callback routes must stay open.
    let request = Request::builder()
        .method("POST")
        .uri("/v1/callbacks/ussd")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(Body::from(
            "sessionId=s1&serviceCode=%2A000%23&phoneNumber=%2B254711000001&text=",
        ))
        .unwrap();
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
