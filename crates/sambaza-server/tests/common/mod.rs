#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use sambaza_server::app;
use sambaza_server::config::{ClientIdConfig, ServerConfig};
use sambaza_server::state::AppState;
use sambaza_storage::auth::hash_token;
use sambaza_storage::Store;
use sambaza_webhook::dispatcher::WebhookDispatcher;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

pub async fn build_test_context() -> Result<TestContext> {
    build_test_context_with(ClientIdConfig::default()).await
}

pub async fn build_test_context_with(client_id: ClientIdConfig) -> Result<TestContext> {
    sambaza_common::id::init(1, 1);

    let temp_dir = tempfile::tempdir()?;
    let db_url = format!("sqlite://{}/test.db?mode=rwc", temp_dir.path().display());
    let store = Arc::new(Store::new(&db_url, temp_dir.path()).await?);

    let password_hash = hash_token("changeme")?;
    let _ = store.create_user("admin", &password_hash).await?;
    sambaza_server::service_seed::init_default_services(&store).await?;

    let mut config = ServerConfig::default();
    config.database.data_dir = temp_dir.path().to_string_lossy().to_string();
    config.client_id = client_id;

    let state = AppState {
        store: store.clone(),
        dispatcher: Arc::new(WebhookDispatcher::new(store)),
        sms: None,
        mpesa: None,
        mailer: None,
        jwt_secret: Arc::new("test-secret".to_string()),
        token_expire_secs: 3600,
        start_time: Utc::now(),
        config: Arc::new(config),
    };

    let app = app::build_http_app(state.clone());
    Ok(TestContext {
        temp_dir,
        state,
        app,
    })
}

/// Send a request with an optional bearer token and JSON body; returns
/// (status, parsed body, X-Trace-Id header).
pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let trace = response
        .headers()
        .get("X-Trace-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body, trace)
}

pub async fn request_no_body(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
) -> (StatusCode, Value, Option<String>) {
    request_json(app, method, uri, token, None).await
}

/// Send a form-encoded request (gateway callbacks); returns the raw body text.
pub async fn request_form(
    app: &axum::Router,
    uri: &str,
    form_body: &str,
) -> (StatusCode, String) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(Body::from(form_body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

pub async fn login_and_get_token(ctx: &TestContext) -> String {
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/auth/login",
        None,
        Some(serde_json::json!({"username": "admin", "password": "changeme"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["data"]["access_token"]
        .as_str()
        .expect("login response should carry access_token")
        .to_string()
}

pub fn assert_ok_envelope(body: &Value) {
    assert_eq!(body["err_code"], 0, "expected ok envelope, got: {body}");
    assert_eq!(body["err_msg"].as_str().is_some(), true);
}

pub fn assert_err_envelope(body: &Value, err_code: i64) {
    assert_eq!(
        body["err_code"], err_code,
        "expected err_code {err_code}, got: {body}"
    );
}
