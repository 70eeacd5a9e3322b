use crate::api::{
    error_response, gateway_error_response, record_audit, success_empty_response, success_response,
};
use crate::auth::Claims;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Form, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sambaza_gateway::sms::DeliveryReport;
use sambaza_webhook::{events, WebhookEvent};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Deserialize, ToSchema)]
pub struct SendMessagesRequest {
    /// 收件手机号列表（必填）
    to: Vec<String>,
    /// 短信内容（必填）
    message: String,
    /// 发送方 ID（可选，缺省用网关账号默认值）
    from: Option<String>,
}

/// 即时发送短信（不落活动，直接透传网关结果）。
/// 鉴权：Bearer Token 或 X-Api-Key。
#[utoipa::path(
    post,
    path = "/v1/messaging/send",
    tag = "Messaging",
    security(("bearer_auth" = []), ("api_key_auth" = [])),
    request_body = SendMessagesRequest,
    responses(
        (status = 200, description = "网关受理结果", body = serde_json::Value),
        (status = 400, description = "收件人为空", body = crate::api::ApiError),
        (status = 401, description = "未认证或网关凭据被拒", body = crate::api::ApiError),
        (status = 429, description = "网关限流", body = crate::api::ApiError),
        (status = 502, description = "网关调用失败", body = crate::api::ApiError),
        (status = 503, description = "网关未配置", body = crate::api::ApiError)
    )
)]
pub async fn send_messages(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<SendMessagesRequest>,
) -> impl IntoResponse {
    let Some(sms) = state.sms.clone() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &trace_id,
            "gateway_not_configured",
            "SMS gateway is not configured",
        )
        .into_response();
    };

    let to: Vec<String> = req
        .to
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect();
    if to.is_empty() || req.message.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "empty_recipients",
            "to and message are required",
        )
        .into_response();
    }

    match sms
        .send_with_retry(&to, &req.message, req.from.as_deref())
        .await
    {
        Ok(data) => {
            record_audit(
                &state,
                &claims.sub,
                "message.send",
                "message",
                None,
                Some(serde_json::json!({"recipients": to.len()})),
            )
            .await;
            success_response(StatusCode::OK, &trace_id, data)
        }
        Err(e) => {
            tracing::error!(error = %e, "Direct SMS send failed");
            gateway_error_response(&trace_id, &e)
        }
    }
}

/// 余额查询响应
#[derive(Serialize, ToSchema)]
struct BalanceResponse {
    /// 网关账户余额（如 "KES 1234.5600"）
    balance: String,
}

/// 查询网关账户余额（透传）。
#[utoipa::path(
    get,
    path = "/v1/messaging/balance",
    tag = "Messaging",
    security(("bearer_auth" = []), ("api_key_auth" = [])),
    responses(
        (status = 200, description = "账户余额", body = BalanceResponse),
        (status = 401, description = "未认证或网关凭据被拒", body = crate::api::ApiError),
        (status = 502, description = "网关调用失败", body = crate::api::ApiError),
        (status = 503, description = "网关未配置", body = crate::api::ApiError)
    )
)]
pub async fn gateway_balance(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let Some(sms) = state.sms.clone() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &trace_id,
            "gateway_not_configured",
            "SMS gateway is not configured",
        )
        .into_response();
    };

    match sms.balance().await {
        Ok(balance) => success_response(StatusCode::OK, &trace_id, BalanceResponse { balance }),
        Err(e) => {
            tracing::error!(error = %e, "Balance check failed");
            gateway_error_response(&trace_id, &e)
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct TopupRequest {
    /// 充值手机号（子账号）
    phone: String,
    /// 金额
    amount: f64,
    /// 币种（默认 KES）
    #[serde(default = "default_currency")]
    currency_code: String,
}

fn default_currency() -> String {
    "KES".to_string()
}

/// 子账号话费充值（透传网关 airtime 接口）。
#[utoipa::path(
    post,
    path = "/v1/messaging/topup",
    tag = "Messaging",
    security(("bearer_auth" = []), ("api_key_auth" = [])),
    request_body = TopupRequest,
    responses(
        (status = 200, description = "充值已受理"),
        (status = 400, description = "参数无效", body = crate::api::ApiError),
        (status = 401, description = "未认证或网关凭据被拒", body = crate::api::ApiError),
        (status = 502, description = "网关调用失败", body = crate::api::ApiError),
        (status = 503, description = "网关未配置", body = crate::api::ApiError)
    )
)]
pub async fn airtime_topup(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<TopupRequest>,
) -> impl IntoResponse {
    let Some(sms) = state.sms.clone() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &trace_id,
            "gateway_not_configured",
            "SMS gateway is not configured",
        )
        .into_response();
    };
    if req.phone.trim().is_empty() || req.amount <= 0.0 {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "phone and a positive amount are required",
        )
        .into_response();
    }

    match sms.topup(&req.phone, req.amount, &req.currency_code).await {
        Ok(()) => {
            record_audit(
                &state,
                &claims.sub,
                "airtime.topup",
                "airtime",
                None,
                Some(serde_json::json!({"phone": req.phone, "amount": req.amount})),
            )
            .await;
            success_empty_response(StatusCode::OK, &trace_id, "Topup accepted")
        }
        Err(e) => {
            tracing::error!(error = %e, "Airtime topup failed");
            gateway_error_response(&trace_id, &e)
        }
    }
}

/// 网关送达回执回调（表单编码）。
/// 两条路径（本回调与 30 秒轮询）都会覆盖活动计数列，后写覆盖先写。
#[utoipa::path(
    post,
    path = "/v1/callbacks/delivery",
    tag = "Callbacks",
    responses(
        (status = 200, description = "回执已处理")
    )
)]
pub async fn delivery_report_callback(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Form(report): Form<DeliveryReport>,
) -> impl IntoResponse {
    let status = report.row_status();
    let updated = match state
        .store
        .update_message_by_gateway_id(
            &report.id,
            status,
            report.failure_reason.as_deref(),
            report.network_code.as_deref(),
        )
        .await
    {
        Ok(row) => row,
        Err(e) => {
            tracing::error!(gateway_id = %report.id, error = %e, "Failed to apply delivery report");
            // Gateways retry on non-2xx; a storage hiccup should not trigger
            // a retry storm, so still answer 200.
            return success_empty_response(StatusCode::OK, &trace_id, "ok");
        }
    };

    match updated {
        Some(msg) => {
            tracing::info!(
                gateway_id = %report.id,
                phone = %report.phone_number,
                status = %status,
                "Delivery report applied"
            );
            crate::api::campaigns::refresh_campaign_counters(&state, &msg.campaign_id, &msg.user_id)
                .await;
            if status == "delivered" {
                let event = WebhookEvent::new(
                    events::MESSAGE_DELIVERED,
                    serde_json::json!({
                        "campaign_id": msg.campaign_id,
                        "message_id": msg.id,
                        "phone": msg.phone,
                        "network_code": msg.network_code,
                    }),
                );
                if let Err(e) = state.dispatcher.dispatch(&msg.user_id, &event).await {
                    tracing::error!(error = %e, "Failed to dispatch message.delivered webhook");
                }
            }
        }
        None => {
            tracing::warn!(gateway_id = %report.id, "Delivery report for unknown message");
        }
    }

    success_empty_response(StatusCode::OK, &trace_id, "ok")
}
