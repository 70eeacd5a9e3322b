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
use sambaza_common::types::TicketStatus;
use sambaza_storage::store::{TicketFilter, TicketRow, TicketUpdate};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

const PRIORITIES: [&str; 4] = ["low", "medium", "high", "urgent"];

#[derive(Deserialize, ToSchema)]
struct CreateTicketRequest {
    subject: String,
    description: String,
    #[serde(default = "default_priority")]
    priority: String,
}

fn default_priority() -> String {
    "medium".to_string()
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct TicketListParams {
    /// 状态精确匹配（status__eq，可选）
    #[param(required = false)]
    #[serde(rename = "status__eq")]
    status_eq: Option<String>,
    /// 优先级精确匹配（priority__eq，可选）
    #[param(required = false)]
    #[serde(rename = "priority__eq")]
    priority_eq: Option<String>,
    /// 标题包含匹配（subject__contains，可选）
    #[param(required = false)]
    #[serde(rename = "subject__contains")]
    subject_contains: Option<String>,
}

/// 分页查询工单。
#[utoipa::path(
    get,
    path = "/v1/tickets",
    tag = "Tickets",
    security(("bearer_auth" = [])),
    params(TicketListParams, PaginationParams),
    responses(
        (status = 200, description = "工单分页列表", body = Vec<serde_json::Value>),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn list_tickets(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(params): Query<TicketListParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let filter = TicketFilter {
        status_eq: params.status_eq,
        priority_eq: params.priority_eq,
        subject_contains: params.subject_contains,
    };
    let total = match state.store.count_tickets(&claims.sub, &filter).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count tickets");
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
        .list_tickets(&claims.sub, &filter, pagination.limit(), pagination.offset())
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
            tracing::error!(error = %e, "Failed to list tickets");
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

/// 创建工单（初始状态 open）。
#[utoipa::path(
    post,
    path = "/v1/tickets",
    tag = "Tickets",
    security(("bearer_auth" = [])),
    request_body = CreateTicketRequest,
    responses(
        (status = 201, description = "工单已创建", body = serde_json::Value),
        (status = 400, description = "参数无效", body = crate::api::ApiError),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn create_ticket(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateTicketRequest>,
) -> impl IntoResponse {
    if req.subject.trim().is_empty() || req.description.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "subject and description are required",
        )
        .into_response();
    }
    if !PRIORITIES.contains(&req.priority.as_str()) {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            &format!("Unknown priority: {}", req.priority),
        )
        .into_response();
    }

    let row = TicketRow {
        id: sambaza_common::id::next_id(),
        user_id: claims.sub.clone(),
        subject: req.subject,
        description: req.description,
        status: TicketStatus::Open.to_string(),
        priority: req.priority,
        assignee: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.insert_ticket(&row).await {
        Ok(created) => {
            record_audit(&state, &claims.sub, "ticket.create", "ticket", Some(&created.id), None)
                .await;
            success_response(StatusCode::CREATED, &trace_id, created)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to create ticket");
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

/// 获取工单详情。
#[utoipa::path(
    get,
    path = "/v1/tickets/{id}",
    tag = "Tickets",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "工单 ID")),
    responses(
        (status = 200, description = "工单详情", body = serde_json::Value),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "工单不存在", body = crate::api::ApiError)
    )
)]
async fn get_ticket(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_ticket(&claims.sub, &id).await {
        Ok(Some(t)) => success_response(StatusCode::OK, &trace_id, t),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Ticket not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get ticket");
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

/// 更新工单（状态流转、改派、改优先级）。
#[utoipa::path(
    put,
    path = "/v1/tickets/{id}",
    tag = "Tickets",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "工单 ID")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "工单已更新", body = serde_json::Value),
        (status = 400, description = "状态或优先级无效", body = crate::api::ApiError),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "工单不存在", body = crate::api::ApiError)
    )
)]
async fn update_ticket(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(upd): Json<TicketUpdate>,
) -> impl IntoResponse {
    if let Some(ref status) = upd.status {
        if status.parse::<TicketStatus>().is_err() {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "invalid_status",
                &format!("Unknown ticket status: {status}"),
            )
            .into_response();
        }
    }
    if let Some(ref priority) = upd.priority {
        if !PRIORITIES.contains(&priority.as_str()) {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "bad_request",
                &format!("Unknown priority: {priority}"),
            )
            .into_response();
        }
    }

    match state.store.update_ticket(&claims.sub, &id, &upd).await {
        Ok(Some(t)) => {
            record_audit(
                &state,
                &claims.sub,
                "ticket.update",
                "ticket",
                Some(&id),
                Some(serde_json::json!({"status": t.status.clone()})),
            )
            .await;
            success_response(StatusCode::OK, &trace_id, t)
        }
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Ticket not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update ticket");
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

/// 删除工单。
#[utoipa::path(
    delete,
    path = "/v1/tickets/{id}",
    tag = "Tickets",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "工单 ID")),
    responses(
        (status = 200, description = "工单已删除"),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "工单不存在", body = crate::api::ApiError)
    )
)]
async fn delete_ticket(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_ticket(&claims.sub, &id).await {
        Ok(true) => {
            record_audit(&state, &claims.sub, "ticket.delete", "ticket", Some(&id), None).await;
            success_empty_response(StatusCode::OK, &trace_id, "Ticket deleted")
        }
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Ticket not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete ticket");
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

pub fn ticket_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_tickets, create_ticket))
        .routes(routes!(get_ticket, update_ticket, delete_ticket))
}
