use crate::api::pagination::PaginationParams;
use crate::api::{error_response, success_paginated_response};
use crate::auth::Claims;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use sambaza_storage::store::AuditLogFilter;
use serde::Deserialize;
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct AuditListParams {
    /// 操作精确匹配（action__eq，可选，如 campaign.send）
    #[param(required = false)]
    #[serde(rename = "action__eq")]
    action_eq: Option<String>,
    /// 资源类型精确匹配（resource_type__eq，可选）
    #[param(required = false)]
    #[serde(rename = "resource_type__eq")]
    resource_type_eq: Option<String>,
    /// 资源 ID 精确匹配（resource_id__eq，可选）
    #[param(required = false)]
    #[serde(rename = "resource_id__eq")]
    resource_id_eq: Option<String>,
    /// 时间下界（Unix 秒级时间戳）
    #[param(required = false)]
    #[serde(rename = "created_at__gte")]
    created_at_gte: Option<i64>,
    /// 时间上界（Unix 秒级时间戳）
    #[param(required = false)]
    #[serde(rename = "created_at__lte")]
    created_at_lte: Option<i64>,
}

/// 分页查询当前用户的审计日志。
/// 默认排序：`created_at` 倒序。
#[utoipa::path(
    get,
    path = "/v1/audit-logs",
    tag = "Audit",
    security(("bearer_auth" = [])),
    params(AuditListParams, PaginationParams),
    responses(
        (status = 200, description = "审计日志分页列表", body = Vec<serde_json::Value>),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn list_audit_logs(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(params): Query<AuditListParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let filter = AuditLogFilter {
        action_eq: params.action_eq,
        resource_type_eq: params.resource_type_eq,
        resource_id_eq: params.resource_id_eq,
        start_time: params.created_at_gte,
        end_time: params.created_at_lte,
    };
    let total = match state.store.count_audit_logs(&claims.sub, &filter).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count audit logs");
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
        .list_audit_logs(&claims.sub, &filter, pagination.limit(), pagination.offset())
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
            tracing::error!(error = %e, "Failed to list audit logs");
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

pub fn audit_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(list_audit_logs))
}
