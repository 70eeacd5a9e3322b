use crate::api::pagination::PaginationParams;
use crate::api::{
    error_response, record_audit, success_empty_response, success_paginated_response,
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
use sambaza_storage::store::{WebhookDeliveryFilter, WebhookEndpointRow, WebhookEndpointUpdate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Deserialize, ToSchema)]
struct CreateWebhookRequest {
    url: String,
    description: Option<String>,
    /// 订阅事件类型列表；空列表表示订阅全部事件
    #[serde(default)]
    events: Vec<String>,
}

/// 创建响应：签名 secret 仅此一次返回
#[derive(Serialize, ToSchema)]
struct CreateWebhookResponse {
    id: String,
    url: String,
    events: Vec<String>,
    /// HMAC 签名密钥（仅创建时返回，请立即保存）
    secret: String,
    created_at: chrono::DateTime<Utc>,
}

/// 分页查询 Webhook 端点。
#[utoipa::path(
    get,
    path = "/v1/webhooks",
    tag = "Webhooks",
    security(("bearer_auth" = [])),
    params(PaginationParams),
    responses(
        (status = 200, description = "Webhook 端点分页列表", body = Vec<serde_json::Value>),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn list_webhooks(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let total = match state.store.count_webhook_endpoints(&claims.sub).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count webhook endpoints");
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
        .list_webhook_endpoints(&claims.sub, pagination.limit(), pagination.offset())
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
            tracing::error!(error = %e, "Failed to list webhook endpoints");
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

/// 注册 Webhook 端点。签名 secret 自动生成，仅创建响应返回一次。
#[utoipa::path(
    post,
    path = "/v1/webhooks",
    tag = "Webhooks",
    security(("bearer_auth" = [])),
    request_body = CreateWebhookRequest,
    responses(
        (status = 201, description = "Webhook 端点已注册", body = CreateWebhookResponse),
        (status = 400, description = "URL 无效", body = crate::api::ApiError),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn create_webhook(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateWebhookRequest>,
) -> impl IntoResponse {
    if !req.url.starts_with("http://") && !req.url.starts_with("https://") {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "url must start with http:// or https://",
        )
        .into_response();
    }

    let secret = format!("whsec_{}", sambaza_storage::auth::generate_token());
    let encrypted_secret = match state.store.secret_encryptor().encrypt(&secret) {
        Ok(enc) => enc,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encrypt webhook secret");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "internal error",
            )
            .into_response();
        }
    };

    let row = WebhookEndpointRow {
        id: sambaza_common::id::next_id(),
        user_id: claims.sub.clone(),
        url: req.url,
        description: req.description,
        encrypted_secret,
        events: req.events,
        enabled: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.insert_webhook_endpoint(&row).await {
        Ok(created) => {
            record_audit(
                &state,
                &claims.sub,
                "webhook.create",
                "webhook_endpoint",
                Some(&created.id),
                Some(serde_json::json!({"url": created.url.clone()})),
            )
            .await;
            success_response(
                StatusCode::CREATED,
                &trace_id,
                CreateWebhookResponse {
                    id: created.id,
                    url: created.url,
                    events: created.events,
                    secret,
                    created_at: created.created_at,
                },
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to create webhook endpoint");
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

/// 更新 Webhook 端点。
#[utoipa::path(
    put,
    path = "/v1/webhooks/{id}",
    tag = "Webhooks",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "端点 ID")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "端点已更新", body = serde_json::Value),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "端点不存在", body = crate::api::ApiError)
    )
)]
async fn update_webhook(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(upd): Json<WebhookEndpointUpdate>,
) -> impl IntoResponse {
    if let Some(ref url) = upd.url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "bad_request",
                "url must start with http:// or https://",
            )
            .into_response();
        }
    }
    match state
        .store
        .update_webhook_endpoint(&claims.sub, &id, &upd)
        .await
    {
        Ok(Some(updated)) => success_response(StatusCode::OK, &trace_id, updated),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Webhook endpoint not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update webhook endpoint");
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

/// 删除 Webhook 端点。
#[utoipa::path(
    delete,
    path = "/v1/webhooks/{id}",
    tag = "Webhooks",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "端点 ID")),
    responses(
        (status = 200, description = "端点已删除"),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "端点不存在", body = crate::api::ApiError)
    )
)]
async fn delete_webhook(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_webhook_endpoint(&claims.sub, &id).await {
        Ok(true) => {
            record_audit(&state, &claims.sub, "webhook.delete", "webhook_endpoint", Some(&id), None)
                .await;
            success_empty_response(StatusCode::OK, &trace_id, "Webhook endpoint deleted")
        }
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Webhook endpoint not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete webhook endpoint");
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

/// 发送测试事件到指定端点。
#[utoipa::path(
    post,
    path = "/v1/webhooks/{id}/test",
    tag = "Webhooks",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "端点 ID")),
    responses(
        (status = 200, description = "测试事件已送达"),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "端点不存在", body = crate::api::ApiError),
        (status = 502, description = "端点响应失败", body = crate::api::ApiError)
    )
)]
async fn test_webhook(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let endpoint = match state.store.get_webhook_endpoint(&claims.sub, &id).await {
        Ok(Some(ep)) => ep,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Webhook endpoint not found",
            )
            .into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get webhook endpoint");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response();
        }
    };

    match state.dispatcher.deliver_test(&endpoint).await {
        Ok(()) => success_empty_response(StatusCode::OK, &trace_id, "Test event delivered"),
        Err(e) => {
            tracing::warn!(endpoint_id = %id, error = %e, "Test webhook delivery failed");
            error_response(
                StatusCode::BAD_GATEWAY,
                &trace_id,
                "gateway_error",
                &format!("Test delivery failed: {e}"),
            )
            .into_response()
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct DeliveryListParams {
    /// 端点 ID 精确匹配（endpoint_id__eq，可选）
    #[param(required = false)]
    #[serde(rename = "endpoint_id__eq")]
    endpoint_id_eq: Option<String>,
    /// 事件类型精确匹配（event_type__eq，可选）
    #[param(required = false)]
    #[serde(rename = "event_type__eq")]
    event_type_eq: Option<String>,
    /// 投递状态精确匹配（status__eq，可选：success / failed）
    #[param(required = false)]
    #[serde(rename = "status__eq")]
    status_eq: Option<String>,
    /// 时间下界（Unix 秒级时间戳）
    #[param(required = false)]
    #[serde(rename = "created_at__gte")]
    created_at_gte: Option<i64>,
    /// 时间上界（Unix 秒级时间戳）
    #[param(required = false)]
    #[serde(rename = "created_at__lte")]
    created_at_lte: Option<i64>,
}

/// 分页查询 Webhook 投递日志。
#[utoipa::path(
    get,
    path = "/v1/webhooks/deliveries",
    tag = "Webhooks",
    security(("bearer_auth" = [])),
    params(DeliveryListParams, PaginationParams),
    responses(
        (status = 200, description = "投递日志分页列表", body = Vec<serde_json::Value>),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn list_webhook_deliveries(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(params): Query<DeliveryListParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let filter = WebhookDeliveryFilter {
        endpoint_id: params.endpoint_id_eq,
        event_type: params.event_type_eq,
        status: params.status_eq,
        start_time: params.created_at_gte,
        end_time: params.created_at_lte,
    };
    let total = match state
        .store
        .count_webhook_deliveries(&claims.sub, &filter)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count webhook deliveries");
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
        .list_webhook_deliveries(&claims.sub, &filter, pagination.limit(), pagination.offset())
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
            tracing::error!(error = %e, "Failed to list webhook deliveries");
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

pub fn webhook_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_webhooks, create_webhook))
        .routes(routes!(list_webhook_deliveries))
        .routes(routes!(update_webhook, delete_webhook))
        .routes(routes!(test_webhook))
}
