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
use sambaza_storage::auth::{api_key_prefix, generate_api_key, hash_token};
use sambaza_storage::store::ApiKeyRow;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Deserialize, ToSchema)]
struct CreateApiKeyRequest {
    name: String,
}

/// 创建响应：明文 key 仅此一次返回
#[derive(Serialize, ToSchema)]
struct CreateApiKeyResponse {
    id: String,
    name: String,
    key_prefix: String,
    /// 完整 API key（仅创建时返回，请立即保存）
    key: String,
    created_at: chrono::DateTime<Utc>,
}

/// 分页查询 API 密钥（仅展示前缀）。
#[utoipa::path(
    get,
    path = "/v1/apikeys",
    tag = "ApiKeys",
    security(("bearer_auth" = [])),
    params(PaginationParams),
    responses(
        (status = 200, description = "API 密钥分页列表", body = Vec<serde_json::Value>),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn list_api_keys(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let total = match state.store.count_api_keys(&claims.sub).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count api keys");
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
        .list_api_keys(&claims.sub, pagination.limit(), pagination.offset())
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
            tracing::error!(error = %e, "Failed to list api keys");
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

/// 创建 API 密钥。明文只在本次响应返回，落库为 bcrypt 哈希 + 加密副本。
#[utoipa::path(
    post,
    path = "/v1/apikeys",
    tag = "ApiKeys",
    security(("bearer_auth" = [])),
    request_body = CreateApiKeyRequest,
    responses(
        (status = 201, description = "API 密钥已创建", body = CreateApiKeyResponse),
        (status = 400, description = "名称为空", body = crate::api::ApiError),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn create_api_key(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateApiKeyRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "name is required",
        )
        .into_response();
    }

    let key = generate_api_key();
    let key_hash = match hash_token(&key) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "Failed to hash api key");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "internal error",
            )
            .into_response();
        }
    };
    let encrypted_key = match state.store.secret_encryptor().encrypt(&key) {
        Ok(enc) => Some(enc),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encrypt api key copy, storing hash only");
            None
        }
    };

    let row = ApiKeyRow {
        id: sambaza_common::id::next_id(),
        user_id: claims.sub.clone(),
        name: req.name.trim().to_string(),
        key_prefix: api_key_prefix(&key),
        key_hash,
        encrypted_key,
        enabled: true,
        last_used_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.insert_api_key(&row).await {
        Ok(created) => {
            record_audit(&state, &claims.sub, "apikey.create", "api_key", Some(&created.id), None)
                .await;
            success_response(
                StatusCode::CREATED,
                &trace_id,
                CreateApiKeyResponse {
                    id: created.id,
                    name: created.name,
                    key_prefix: created.key_prefix,
                    key,
                    created_at: created.created_at,
                },
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to create api key");
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

#[derive(Deserialize, ToSchema)]
struct SetEnabledRequest {
    enabled: bool,
}

/// 启用/停用 API 密钥。
#[utoipa::path(
    put,
    path = "/v1/apikeys/{id}",
    tag = "ApiKeys",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "密钥 ID")),
    request_body = SetEnabledRequest,
    responses(
        (status = 200, description = "状态已更新", body = serde_json::Value),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "密钥不存在", body = crate::api::ApiError)
    )
)]
async fn set_api_key_enabled(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetEnabledRequest>,
) -> impl IntoResponse {
    match state
        .store
        .set_api_key_enabled(&claims.sub, &id, req.enabled)
        .await
    {
        Ok(Some(updated)) => {
            record_audit(
                &state,
                &claims.sub,
                "apikey.set_enabled",
                "api_key",
                Some(&id),
                Some(serde_json::json!({"enabled": req.enabled})),
            )
            .await;
            success_response(StatusCode::OK, &trace_id, updated)
        }
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "API key not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update api key");
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

/// 删除（吊销）API 密钥。
#[utoipa::path(
    delete,
    path = "/v1/apikeys/{id}",
    tag = "ApiKeys",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "密钥 ID")),
    responses(
        (status = 200, description = "密钥已删除"),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "密钥不存在", body = crate::api::ApiError)
    )
)]
async fn delete_api_key(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_api_key(&claims.sub, &id).await {
        Ok(true) => {
            record_audit(&state, &claims.sub, "apikey.delete", "api_key", Some(&id), None).await;
            success_empty_response(StatusCode::OK, &trace_id, "API key deleted")
        }
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "API key not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete api key");
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

pub fn apikey_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_api_keys, create_api_key))
        .routes(routes!(set_api_key_enabled, delete_api_key))
}
