use crate::api::pagination::PaginationParams;
use crate::api::{
    error_response, record_audit, success_empty_response, success_paginated_response,
    success_response,
};
use crate::auth::Claims;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Form, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use sambaza_storage::store::{
    SurveyResponseRow, UssdMenuRow, UssdMenuUpdate, UssdSessionLogFilter, UssdSessionLogRow,
};
use sambaza_ussd::{UssdMenu, UssdReply};
use sambaza_webhook::{events, WebhookEvent};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Deserialize, ToSchema)]
struct CreateMenuRequest {
    /// USSD 服务代码（如 *384*42#，全局唯一）
    service_code: String,
    name: String,
    /// 菜单屏幕树定义
    menu: serde_json::Value,
    /// 关联问卷：终点选项路径会作为一条回答记录
    survey_id: Option<String>,
}

/// 分页查询 USSD 菜单。
#[utoipa::path(
    get,
    path = "/v1/ussd/menus",
    tag = "Ussd",
    security(("bearer_auth" = [])),
    params(PaginationParams),
    responses(
        (status = 200, description = "USSD 菜单分页列表", body = Vec<serde_json::Value>),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn list_menus(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let total = match state.store.count_ussd_menus(&claims.sub).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count ussd menus");
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
        .list_ussd_menus(&claims.sub, pagination.limit(), pagination.offset())
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
            tracing::error!(error = %e, "Failed to list ussd menus");
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

/// 创建 USSD 菜单（menu 必须通过屏幕树校验）。
#[utoipa::path(
    post,
    path = "/v1/ussd/menus",
    tag = "Ussd",
    security(("bearer_auth" = [])),
    request_body = CreateMenuRequest,
    responses(
        (status = 201, description = "菜单已创建", body = serde_json::Value),
        (status = 400, description = "菜单定义无效", body = crate::api::ApiError),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 409, description = "服务代码已存在", body = crate::api::ApiError)
    )
)]
async fn create_menu(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateMenuRequest>,
) -> impl IntoResponse {
    if req.service_code.trim().is_empty() || req.name.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "service_code and name are required",
        )
        .into_response();
    }

    let menu_json = req.menu.to_string();
    if let Err(e) = UssdMenu::from_json(&menu_json) {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "invalid_menu",
            &e.to_string(),
        )
        .into_response();
    }

    let row = UssdMenuRow {
        id: sambaza_common::id::next_id(),
        user_id: claims.sub.clone(),
        service_code: req.service_code,
        name: req.name,
        menu_json,
        survey_id: req.survey_id,
        enabled: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.insert_ussd_menu(&row).await {
        Ok(created) => {
            record_audit(
                &state,
                &claims.sub,
                "ussd.menu_create",
                "ussd_menu",
                Some(&created.id),
                Some(serde_json::json!({"service_code": created.service_code.clone()})),
            )
            .await;
            success_response(StatusCode::CREATED, &trace_id, created)
        }
        Err(e) => {
            if sambaza_storage::error::is_unique_violation(&e) {
                error_response(
                    StatusCode::CONFLICT,
                    &trace_id,
                    "conflict",
                    "Service code already registered",
                )
                .into_response()
            } else {
                tracing::error!(error = %e, "Failed to create ussd menu");
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
}

/// 更新 USSD 菜单。
#[utoipa::path(
    put,
    path = "/v1/ussd/menus/{id}",
    tag = "Ussd",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "菜单 ID")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "菜单已更新", body = serde_json::Value),
        (status = 400, description = "菜单定义无效", body = crate::api::ApiError),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "菜单不存在", body = crate::api::ApiError)
    )
)]
async fn update_menu(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(upd): Json<UssdMenuUpdate>,
) -> impl IntoResponse {
    if let Some(ref raw) = upd.menu_json {
        if let Err(e) = UssdMenu::from_json(raw) {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "invalid_menu",
                &e.to_string(),
            )
            .into_response();
        }
    }

    match state.store.update_ussd_menu(&claims.sub, &id, &upd).await {
        Ok(Some(m)) => success_response(StatusCode::OK, &trace_id, m),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Menu not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update ussd menu");
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

/// 删除 USSD 菜单。
#[utoipa::path(
    delete,
    path = "/v1/ussd/menus/{id}",
    tag = "Ussd",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "菜单 ID")),
    responses(
        (status = 200, description = "菜单已删除"),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "菜单不存在", body = crate::api::ApiError)
    )
)]
async fn delete_menu(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_ussd_menu(&claims.sub, &id).await {
        Ok(true) => {
            record_audit(&state, &claims.sub, "ussd.menu_delete", "ussd_menu", Some(&id), None)
                .await;
            success_empty_response(StatusCode::OK, &trace_id, "Menu deleted")
        }
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Menu not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete ussd menu");
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
struct SessionLogParams {
    /// 会话 ID 精确匹配（session_id__eq，可选）
    #[param(required = false)]
    #[serde(rename = "session_id__eq")]
    session_id_eq: Option<String>,
    /// 手机号包含匹配（phone__contains，可选）
    #[param(required = false)]
    #[serde(rename = "phone__contains")]
    phone_contains: Option<String>,
    /// 是否终态（terminal__eq，可选）
    #[param(required = false)]
    #[serde(rename = "terminal__eq")]
    terminal_eq: Option<bool>,
}

/// 分页查询某菜单的会话日志。
#[utoipa::path(
    get,
    path = "/v1/ussd/menus/{id}/sessions",
    tag = "Ussd",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "菜单 ID"), SessionLogParams, PaginationParams),
    responses(
        (status = 200, description = "会话日志分页列表", body = Vec<serde_json::Value>),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "菜单不存在", body = crate::api::ApiError)
    )
)]
async fn list_session_logs(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SessionLogParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    // 先校验菜单归属，再按服务代码查日志
    let menu = match state.store.get_ussd_menu(&claims.sub, &id).await {
        Ok(Some(m)) => m,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Menu not found",
            )
            .into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get ussd menu");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response();
        }
    };

    let filter = UssdSessionLogFilter {
        session_id_eq: params.session_id_eq,
        phone_contains: params.phone_contains,
        terminal_eq: params.terminal_eq,
    };
    let total = match state
        .store
        .count_ussd_session_logs(&menu.service_code, &filter)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count session logs");
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
        .list_ussd_session_logs(
            &menu.service_code,
            &filter,
            pagination.limit(),
            pagination.offset(),
        )
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
            tracing::error!(error = %e, "Failed to list session logs");
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

/// USSD 网关回调表单
#[derive(Deserialize, ToSchema)]
pub struct UssdCallbackForm {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "serviceCode")]
    pub service_code: String,
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
    /// 累积输入（如 "1*2"），首次请求为空串
    #[serde(default)]
    pub text: String,
}

fn plain_text(reply: &UssdReply) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        reply.render(),
    )
}

/// USSD 网关回调：按累积输入走一遍菜单树，应答 CON/END 文本。
/// 每次命中都追加一条会话日志；除日志外不保存会话状态。
#[utoipa::path(
    post,
    path = "/v1/callbacks/ussd",
    tag = "Callbacks",
    responses(
        (status = 200, description = "CON/END 文本应答")
    )
)]
pub async fn ussd_callback(
    State(state): State<AppState>,
    Form(form): Form<UssdCallbackForm>,
) -> axum::response::Response {
    let menu_row = match state
        .store
        .get_ussd_menu_by_service_code(&form.service_code)
        .await
    {
        Ok(Some(m)) if m.enabled => m,
        Ok(_) => {
            tracing::warn!(service_code = %form.service_code, "USSD request for unknown or disabled menu");
            return plain_text(&UssdReply::End("Service not available".to_string()))
                .into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load ussd menu");
            return plain_text(&UssdReply::End(
                "Service temporarily unavailable".to_string(),
            ))
            .into_response();
        }
    };

    let menu = match UssdMenu::from_json(&menu_row.menu_json) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(menu_id = %menu_row.id, error = %e, "Stored ussd menu failed validation");
            return plain_text(&UssdReply::End(
                "Service temporarily unavailable".to_string(),
            ))
            .into_response();
        }
    };

    let traversal = menu.traverse(&form.text);
    let reply_text = traversal.reply.render();

    let log = UssdSessionLogRow {
        id: sambaza_common::id::next_id(),
        session_id: form.session_id.clone(),
        service_code: form.service_code.clone(),
        phone: form.phone_number.clone(),
        input_text: form.text.clone(),
        response_text: reply_text.clone(),
        screen: traversal.screen.clone(),
        terminal: traversal.reply.is_terminal(),
        created_at: Utc::now(),
    };
    if let Err(e) = state.store.insert_ussd_session_log(&log).await {
        tracing::error!(error = %e, "Failed to insert ussd session log");
    }

    // Terminal hit on a survey-backed menu records the chosen path as a
    // response row and notifies webhook subscribers.
    if traversal.reply.is_terminal() {
        if let Some(ref survey_id) = menu_row.survey_id {
            match state.store.get_survey_unscoped(survey_id).await {
                Ok(Some(survey)) => {
                    let response = SurveyResponseRow {
                        id: sambaza_common::id::next_id(),
                        survey_id: survey.id.clone(),
                        user_id: survey.user_id.clone(),
                        respondent_phone: form.phone_number.clone(),
                        answers_json: serde_json::json!({"path": traversal.path}).to_string(),
                        completed: true,
                        created_at: Utc::now(),
                    };
                    match state.store.insert_survey_response(&response).await {
                        Ok(created) => {
                            let event = WebhookEvent::new(
                                events::SURVEY_RESPONSE_RECEIVED,
                                serde_json::json!({
                                    "survey_id": survey.id,
                                    "response_id": created.id,
                                    "phone": created.respondent_phone,
                                }),
                            );
                            if let Err(e) = state.dispatcher.dispatch(&survey.user_id, &event).await
                            {
                                tracing::error!(error = %e, "Failed to dispatch survey webhook");
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to record survey response");
                        }
                    }
                }
                Ok(None) => {
                    tracing::warn!(survey_id = %survey_id, "USSD menu references missing survey");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load survey for ussd menu");
                }
            }
        }
    }

    plain_text(&traversal.reply).into_response()
}

pub fn ussd_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_menus, create_menu))
        .routes(routes!(update_menu, delete_menu))
        .routes(routes!(list_session_logs))
}
