use crate::api::{error_response, record_audit, success_response};
use crate::auth::Claims;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use sambaza_common::types::ActivationStatus;
use sambaza_storage::store::ServiceActivationRow;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// 服务目录条目 + 当前用户开通状态
#[derive(Serialize, ToSchema)]
struct ServiceOverview {
    id: String,
    code: String,
    name: String,
    description: Option<String>,
    enabled: bool,
    /// 当前用户的开通记录（未开通为 null）
    activation: Option<ServiceActivationRow>,
}

/// 列出服务目录（含当前用户的开通状态）。
#[utoipa::path(
    get,
    path = "/v1/services",
    tag = "Services",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "服务目录", body = Vec<ServiceOverview>),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn list_services(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let services = match state.store.list_services().await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list services");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response();
        }
    };
    let activations = match state.store.list_activations(&claims.sub).await {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list activations");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response();
        }
    };

    let result: Vec<ServiceOverview> = services
        .into_iter()
        .map(|svc| {
            let activation = activations
                .iter()
                .find(|a| a.service_id == svc.id)
                .cloned();
            ServiceOverview {
                id: svc.id,
                code: svc.code,
                name: svc.name,
                description: svc.description,
                enabled: svc.enabled,
                activation,
            }
        })
        .collect();

    success_response(StatusCode::OK, &trace_id, result)
}

/// 申请开通服务（按目录 code）。重复申请返回现有记录。
#[utoipa::path(
    post,
    path = "/v1/services/{code}/activate",
    tag = "Services",
    security(("bearer_auth" = [])),
    params(("code" = String, Path, description = "服务代码（sms / ussd / mpesa / ...）")),
    responses(
        (status = 201, description = "开通申请已创建", body = serde_json::Value),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "服务不存在", body = crate::api::ApiError),
        (status = 409, description = "服务已停用", body = crate::api::ApiError)
    )
)]
async fn activate_service(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    let service = match state.store.get_service_by_code(&code).await {
        Ok(Some(s)) => s,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                &format!("Service '{code}' not found"),
            )
            .into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get service");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response();
        }
    };
    if !service.enabled {
        return error_response(
            StatusCode::CONFLICT,
            &trace_id,
            "service_disabled",
            &format!("Service '{code}' is disabled"),
        )
        .into_response();
    }

    match state.store.get_activation(&claims.sub, &service.id).await {
        Ok(Some(existing)) => {
            return success_response(StatusCode::OK, &trace_id, existing);
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(error = %e, "Failed to query activation");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response();
        }
    }

    let row = ServiceActivationRow {
        id: sambaza_common::id::next_id(),
        user_id: claims.sub.clone(),
        service_id: service.id.clone(),
        // 开通即生效；审核流程由运营侧在后台切换状态
        status: ActivationStatus::Active.to_string(),
        activated_at: Some(Utc::now()),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    match state.store.insert_activation(&row).await {
        Ok(created) => {
            record_audit(
                &state,
                &claims.sub,
                "service.activate",
                "service_activation",
                Some(&created.id),
                Some(serde_json::json!({"service": code})),
            )
            .await;
            success_response(StatusCode::CREATED, &trace_id, created)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to create activation");
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
struct UpdateActivationRequest {
    /// 目标状态：pending / active / suspended
    status: String,
}

/// 切换开通记录状态（暂停/恢复）。
#[utoipa::path(
    put,
    path = "/v1/services/activations/{id}",
    tag = "Services",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "开通记录 ID")),
    request_body = UpdateActivationRequest,
    responses(
        (status = 200, description = "状态已更新", body = serde_json::Value),
        (status = 400, description = "状态值无效", body = crate::api::ApiError),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "开通记录不存在", body = crate::api::ApiError)
    )
)]
async fn update_activation(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateActivationRequest>,
) -> impl IntoResponse {
    if req.status.parse::<ActivationStatus>().is_err() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "invalid_status",
            &format!("Unknown activation status: {}", req.status),
        )
        .into_response();
    }

    match state
        .store
        .update_activation_status(&claims.sub, &id, &req.status)
        .await
    {
        Ok(Some(updated)) => {
            record_audit(
                &state,
                &claims.sub,
                "service.activation_update",
                "service_activation",
                Some(&id),
                Some(serde_json::json!({"status": req.status})),
            )
            .await;
            success_response(StatusCode::OK, &trace_id, updated)
        }
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Activation not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update activation");
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

pub fn service_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_services))
        .routes(routes!(activate_service))
        .routes(routes!(update_activation))
}
