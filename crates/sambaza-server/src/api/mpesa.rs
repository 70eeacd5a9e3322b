use crate::api::pagination::PaginationParams;
use crate::api::{
    error_response, gateway_error_response, record_audit, success_paginated_response,
    success_response,
};
use crate::auth::Claims;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use sambaza_gateway::mpesa::StkCallbackEnvelope;
use sambaza_storage::store::{MpesaCallbackUpdate, MpesaTransactionFilter, MpesaTransactionRow};
use sambaza_webhook::{events, WebhookEvent};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Deserialize, ToSchema)]
struct StkPushRequest {
    /// 付款人手机号（254 开头国际格式）
    phone: String,
    /// 金额（整数先令）
    amount: f64,
    /// 账单参考号（对账用，可选）
    account_reference: Option<String>,
    /// 描述（显示在付款提示上，可选）
    description: Option<String>,
}

/// 发起 STK push 收款：网关受理后落一条 pending 交易行，
/// 结果由异步回调写回。
#[utoipa::path(
    post,
    path = "/v1/payments/stkpush",
    tag = "Payments",
    security(("bearer_auth" = [])),
    request_body = StkPushRequest,
    responses(
        (status = 201, description = "收款请求已受理", body = serde_json::Value),
        (status = 400, description = "参数无效", body = crate::api::ApiError),
        (status = 401, description = "未认证或网关凭据被拒", body = crate::api::ApiError),
        (status = 502, description = "网关调用失败", body = crate::api::ApiError),
        (status = 503, description = "网关未配置", body = crate::api::ApiError)
    )
)]
async fn stk_push(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<StkPushRequest>,
) -> impl IntoResponse {
    let Some(mpesa) = state.mpesa.clone() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &trace_id,
            "gateway_not_configured",
            "M-Pesa gateway is not configured",
        )
        .into_response();
    };
    if req.phone.trim().is_empty() || req.amount < 1.0 {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "phone and an amount of at least 1 are required",
        )
        .into_response();
    }

    let account_reference = req.account_reference.unwrap_or_else(|| "sambaza".to_string());
    let description = req.description.unwrap_or_else(|| "Payment".to_string());

    let response = match mpesa
        .stk_push(&req.phone, req.amount, &account_reference, &description)
        .await
    {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "STK push failed");
            return gateway_error_response(&trace_id, &e);
        }
    };

    let row = MpesaTransactionRow {
        id: sambaza_common::id::next_id(),
        user_id: claims.sub.clone(),
        phone: req.phone,
        amount: req.amount,
        account_reference: Some(account_reference),
        description: Some(description),
        merchant_request_id: Some(response.merchant_request_id.clone()),
        checkout_request_id: Some(response.checkout_request_id.clone()),
        status: "pending".to_string(),
        result_code: None,
        result_desc: None,
        mpesa_receipt: None,
        transaction_date: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.insert_mpesa_transaction(&row).await {
        Ok(created) => {
            record_audit(
                &state,
                &claims.sub,
                "payment.initiate",
                "mpesa_transaction",
                Some(&created.id),
                Some(serde_json::json!({"amount": created.amount})),
            )
            .await;
            success_response(StatusCode::CREATED, &trace_id, created)
        }
        Err(e) => {
            // The prompt is already on the payer's handset; surface the row
            // failure but keep the gateway ids in the log for manual repair.
            tracing::error!(
                checkout_request_id = %response.checkout_request_id,
                error = %e,
                "STK push accepted but transaction row insert failed"
            );
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response()
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct TransactionListParams {
    /// 状态精确匹配（status__eq，可选）
    #[param(required = false)]
    #[serde(rename = "status__eq")]
    status_eq: Option<String>,
    /// 手机号包含匹配（phone__contains，可选）
    #[param(required = false)]
    #[serde(rename = "phone__contains")]
    phone_contains: Option<String>,
    /// 时间下界（Unix 秒级时间戳）
    #[param(required = false)]
    #[serde(rename = "created_at__gte")]
    created_at_gte: Option<i64>,
    /// 时间上界（Unix 秒级时间戳）
    #[param(required = false)]
    #[serde(rename = "created_at__lte")]
    created_at_lte: Option<i64>,
}

/// 分页查询 M-Pesa 交易。
#[utoipa::path(
    get,
    path = "/v1/payments/transactions",
    tag = "Payments",
    security(("bearer_auth" = [])),
    params(TransactionListParams, PaginationParams),
    responses(
        (status = 200, description = "交易分页列表", body = Vec<serde_json::Value>),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn list_transactions(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(params): Query<TransactionListParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let filter = MpesaTransactionFilter {
        status_eq: params.status_eq,
        phone_contains: params.phone_contains,
        start_time: params.created_at_gte,
        end_time: params.created_at_lte,
    };
    let total = match state
        .store
        .count_mpesa_transactions(&claims.sub, &filter)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count transactions");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response();
        }
    };
    match state
        .store
        .list_mpesa_transactions(&claims.sub, &filter, pagination.limit(), pagination.offset())
        .await
    {
        Ok(items) => success_paginated_response(
            StatusCode::OK,
            &trace_id,
            items,
            total,
            pagination.limit(),
            pagination.offset(),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list transactions");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response()
        }
    }
}

/// 获取单笔交易详情。
#[utoipa::path(
    get,
    path = "/v1/payments/transactions/{id}",
    tag = "Payments",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "交易 ID")),
    responses(
        (status = 200, description = "交易详情", body = serde_json::Value),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "交易不存在", body = crate::api::ApiError)
    )
)]
async fn get_transaction(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_mpesa_transaction(&claims.sub, &id).await {
        Ok(Some(tx)) => success_response(StatusCode::OK, &trace_id, tx),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Transaction not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get transaction");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response()
        }
    }
}

/// M-Pesa 异步结果回调。
/// 永远应答 ResultCode 0，避免网关重试风暴；未匹配的 checkout id 仅记日志。
#[utoipa::path(
    post,
    path = "/v1/callbacks/mpesa",
    tag = "Callbacks",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "回调已受理")
    )
)]
pub async fn mpesa_callback(
    State(state): State<AppState>,
    Json(envelope): Json<StkCallbackEnvelope>,
) -> impl IntoResponse {
    let cb = envelope.body.stk_callback;

    let upd = MpesaCallbackUpdate {
        status: cb.row_status().to_string(),
        result_code: cb.result_code,
        result_desc: cb.result_desc.clone(),
        mpesa_receipt: cb.receipt(),
        transaction_date: cb.transaction_date(),
    };

    match state
        .store
        .apply_mpesa_callback(&cb.checkout_request_id, &upd)
        .await
    {
        Ok(Some(tx)) => {
            tracing::info!(
                checkout_request_id = %cb.checkout_request_id,
                result_code = cb.result_code,
                status = %tx.status,
                "M-Pesa callback applied"
            );
            let event_type = match tx.status.as_str() {
                "completed" => Some(events::PAYMENT_COMPLETED),
                "failed" | "cancelled" => Some(events::PAYMENT_FAILED),
                _ => None,
            };
            if let Some(event_type) = event_type {
                let event = WebhookEvent::new(
                    event_type,
                    serde_json::json!({
                        "transaction_id": tx.id,
                        "phone": tx.phone,
                        "amount": tx.amount,
                        "receipt": tx.mpesa_receipt,
                        "result_code": cb.result_code,
                        "result_desc": cb.result_desc,
                    }),
                );
                if let Err(e) = state.dispatcher.dispatch(&tx.user_id, &event).await {
                    tracing::error!(error = %e, "Failed to dispatch payment webhook");
                }
            }
        }
        Ok(None) => {
            tracing::warn!(
                checkout_request_id = %cb.checkout_request_id,
                "M-Pesa callback for unknown transaction"
            );
        }
        Err(e) => {
            tracing::error!(
                checkout_request_id = %cb.checkout_request_id,
                error = %e,
                "Failed to apply M-Pesa callback"
            );
        }
    }

    Json(serde_json::json!({"ResultCode": 0, "ResultDesc": "Accepted"}))
}

pub fn payment_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(stk_push))
        .routes(routes!(list_transactions))
        .routes(routes!(get_transaction))
}
