pub mod apikeys;
pub mod audit;
pub mod campaigns;
pub mod contacts;
pub mod dashboard;
pub mod messaging;
pub mod mpesa;
pub mod pagination;
pub mod services;
pub mod surveys;
pub mod tickets;
pub mod ussd;
pub mod webhooks;

use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use sambaza_gateway::error::{FailureClass, GatewayError};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// API 错误响应
#[derive(Serialize, ToSchema)]
pub struct ApiError {
    /// 错误码
    pub err_code: i32,
    /// 错误信息
    pub err_msg: String,
    /// 链路追踪 ID（默认空字符串）
    pub trace_id: String,
}

/// API 统一响应包裹
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// 错误码（成功时为 0）
    pub err_code: i32,
    /// 错误信息（成功时为 success）
    pub err_msg: String,
    /// 链路追踪 ID（默认空字符串）
    pub trace_id: String,
    /// 业务数据（有数据时返回）
    pub data: Option<T>,
}

/// 分页数据结构
#[derive(Serialize, ToSchema)]
pub struct PaginatedData<T>
where
    T: Serialize,
{
    /// 数据项列表
    pub items: Vec<T>,
    /// 总数
    pub total: u64,
    /// 每页数量
    pub limit: usize,
    /// 偏移量
    pub offset: usize,
}

pub fn success_response<T>(status: StatusCode, trace_id: &str, data: T) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            err_code: 0,
            err_msg: "success".to_string(),
            trace_id: trace_id.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

pub fn success_empty_response(status: StatusCode, trace_id: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: 0,
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

pub fn success_paginated_response<T>(
    status: StatusCode,
    trace_id: &str,
    items: Vec<T>,
    total: u64,
    limit: usize,
    offset: usize,
) -> Response
where
    T: Serialize,
{
    success_response(
        status,
        trace_id,
        PaginatedData {
            items,
            total,
            limit,
            offset,
        },
    )
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "unauthorized" => 1002,
        "token_expired" => 1003,
        "not_found" => 1004,
        "conflict" => 1005,
        "client_id_missing" => 1008,
        "client_id_invalid" => 1009,
        "invalid_status" => 1101,
        "empty_recipients" => 1102,
        "invalid_menu" => 1103,
        "invalid_questions" => 1104,
        "invalid_phone" => 1105,
        "not_editable" => 1106,
        "service_disabled" => 1107,
        "gateway_not_configured" => 1201,
        "gateway_error" => 1202,
        "gateway_unauthorized" => 1203,
        "gateway_rate_limited" => 1204,
        "storage_error" => 1501,
        "internal_error" => 1500,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

/// 把网关错误按分类映射为响应（网络/限流可重试，凭据类不可）。
pub fn gateway_error_response(trace_id: &str, err: &GatewayError) -> Response {
    match err.classify() {
        FailureClass::Credentials => error_response(
            StatusCode::UNAUTHORIZED,
            trace_id,
            "gateway_unauthorized",
            &format!("Gateway rejected credentials: {err}"),
        ),
        FailureClass::Throttled => error_response(
            StatusCode::TOO_MANY_REQUESTS,
            trace_id,
            "gateway_rate_limited",
            "Gateway rate limited, try again shortly",
        ),
        FailureClass::Network | FailureClass::Other => error_response(
            StatusCode::BAD_GATEWAY,
            trace_id,
            "gateway_error",
            &format!("Gateway call failed: {err}"),
        ),
    }
}

/// 审计写入失败只记日志，不影响业务响应。
pub async fn record_audit(
    state: &AppState,
    user_id: &str,
    action: &str,
    resource_type: &str,
    resource_id: Option<&str>,
    detail: Option<Value>,
) {
    let row = sambaza_storage::store::AuditLogRow {
        id: sambaza_common::id::next_id(),
        user_id: user_id.to_string(),
        action: action.to_string(),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.map(str::to_string),
        detail_json: detail.map(|v| v.to_string()),
        ip_address: None,
        created_at: Utc::now(),
    };
    if let Err(e) = state.store.insert_audit_log(&row).await {
        tracing::error!(action = %row.action, error = %e, "Failed to write audit log");
    }
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
struct HealthResponse {
    /// 服务版本号
    version: String,
    /// 运行时长（秒）
    uptime_secs: i64,
    /// 存储状态
    storage_status: String,
}

/// 获取服务健康状态。
/// 鉴权：无需 Bearer Token，但需要 sbz-client-id 请求头（如果在配置中启用）。
#[utoipa::path(
    get,
    path = "/v1/health",
    tag = "Health",
    security(("client_id_auth" = [])),
    responses(
        (status = 200, description = "服务健康状态", body = HealthResponse),
        (status = 403, description = "缺少或无效的 sbz-client-id", body = ApiError)
    )
)]
async fn health(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let uptime = (Utc::now() - state.start_time).num_seconds();
    let storage_status = match state.store.count_services().await {
        Ok(_) => "ok".to_string(),
        Err(_) => "degraded".to_string(),
    };
    success_response(
        StatusCode::OK,
        &trace_id,
        HealthResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: uptime,
            storage_status,
        },
    )
}

pub fn public_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(health))
}

pub fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(crate::auth::login))
}

/// 网关回调路由：无登录态，也不做 sbz-client-id 校验（网关不带该头）。
pub fn callback_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(ussd::ussd_callback))
        .routes(routes!(mpesa::mpesa_callback))
        .routes(routes!(messaging::delivery_report_callback))
}

pub fn protected_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(crate::auth::change_password))
        .merge(campaigns::campaign_routes())
        .merge(contacts::contact_routes())
        .merge(services::service_routes())
        .merge(apikeys::apikey_routes())
        .merge(webhooks::webhook_routes())
        .merge(surveys::survey_routes())
        .merge(mpesa::payment_routes())
        .merge(ussd::ussd_routes())
        .merge(tickets::ticket_routes())
        .merge(audit::audit_routes())
        .merge(dashboard::dashboard_routes())
}

/// 消息发送路由：支持 JWT 或 X-Api-Key 两种鉴权（中间件在 app.rs 挂载）。
pub fn messaging_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(messaging::send_messages))
        .routes(routes!(messaging::gateway_balance))
        .routes(routes!(messaging::airtime_topup))
}
