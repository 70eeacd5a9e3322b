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
use sambaza_storage::store::{ContactFilter, ContactRow, ContactUpdate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Deserialize, ToSchema)]
struct CreateContactRequest {
    phone: String,
    name: Option<String>,
    email: Option<String>,
    group_name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
struct ImportContactsRequest {
    contacts: Vec<CreateContactRequest>,
}

/// 批量导入结果
#[derive(Serialize, ToSchema)]
struct ImportContactsResult {
    imported: u32,
    skipped: u32,
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct ContactListParams {
    /// 手机号包含匹配（phone__contains，可选）
    #[param(required = false)]
    #[serde(rename = "phone__contains")]
    phone_contains: Option<String>,
    /// 分组精确匹配（group_name__eq，可选）
    #[param(required = false)]
    #[serde(rename = "group_name__eq")]
    group_name_eq: Option<String>,
    /// 退订状态精确匹配（opted_out__eq，可选）
    #[param(required = false)]
    #[serde(rename = "opted_out__eq")]
    opted_out_eq: Option<bool>,
}

fn normalized_phone(raw: &str) -> Option<String> {
    let trimmed: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = trimmed.strip_prefix('+').unwrap_or(&trimmed);
    if digits.len() < 9 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(trimmed)
}

/// 分页查询联系人列表。
#[utoipa::path(
    get,
    path = "/v1/contacts",
    tag = "Contacts",
    security(("bearer_auth" = [])),
    params(ContactListParams, PaginationParams),
    responses(
        (status = 200, description = "联系人分页列表", body = Vec<serde_json::Value>),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn list_contacts(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(params): Query<ContactListParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let filter = ContactFilter {
        phone_contains: params.phone_contains,
        group_name_eq: params.group_name_eq,
        opted_out_eq: params.opted_out_eq,
    };
    let total = match state.store.count_contacts(&claims.sub, &filter).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count contacts");
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
        .list_contacts(&claims.sub, &filter, pagination.limit(), pagination.offset())
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
            tracing::error!(error = %e, "Failed to list contacts");
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

/// 创建联系人。
#[utoipa::path(
    post,
    path = "/v1/contacts",
    tag = "Contacts",
    security(("bearer_auth" = [])),
    request_body = CreateContactRequest,
    responses(
        (status = 201, description = "联系人已创建", body = serde_json::Value),
        (status = 400, description = "手机号无效", body = crate::api::ApiError),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 409, description = "手机号已存在", body = crate::api::ApiError)
    )
)]
async fn create_contact(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateContactRequest>,
) -> impl IntoResponse {
    let Some(phone) = normalized_phone(&req.phone) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "invalid_phone",
            &format!("Invalid phone number: {}", req.phone),
        )
        .into_response();
    };

    let row = ContactRow {
        id: sambaza_common::id::next_id(),
        user_id: claims.sub.clone(),
        phone,
        name: req.name,
        email: req.email,
        group_name: req.group_name,
        opted_out: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.insert_contact(&row).await {
        Ok(created) => {
            record_audit(&state, &claims.sub, "contact.create", "contact", Some(&created.id), None)
                .await;
            success_response(StatusCode::CREATED, &trace_id, created)
        }
        Err(e) => {
            if sambaza_storage::error::is_unique_violation(&e) {
                error_response(
                    StatusCode::CONFLICT,
                    &trace_id,
                    "conflict",
                    "Contact phone already exists",
                )
                .into_response()
            } else {
                tracing::error!(error = %e, "Failed to create contact");
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

/// 批量导入联系人（手机号重复或无效的行跳过）。
#[utoipa::path(
    post,
    path = "/v1/contacts/import",
    tag = "Contacts",
    security(("bearer_auth" = [])),
    request_body = ImportContactsRequest,
    responses(
        (status = 200, description = "导入结果", body = ImportContactsResult),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn import_contacts(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<ImportContactsRequest>,
) -> impl IntoResponse {
    let mut imported = 0u32;
    let mut skipped = 0u32;

    for entry in req.contacts {
        let Some(phone) = normalized_phone(&entry.phone) else {
            skipped += 1;
            continue;
        };
        let row = ContactRow {
            id: sambaza_common::id::next_id(),
            user_id: claims.sub.clone(),
            phone,
            name: entry.name,
            email: entry.email,
            group_name: entry.group_name,
            opted_out: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        match state.store.insert_contact(&row).await {
            Ok(_) => imported += 1,
            Err(e) => {
                if !sambaza_storage::error::is_unique_violation(&e) {
                    tracing::warn!(error = %e, phone = %row.phone, "Contact import row failed");
                }
                skipped += 1;
            }
        }
    }

    record_audit(
        &state,
        &claims.sub,
        "contact.import",
        "contact",
        None,
        Some(serde_json::json!({"imported": imported, "skipped": skipped})),
    )
    .await;

    success_response(
        StatusCode::OK,
        &trace_id,
        ImportContactsResult { imported, skipped },
    )
}

/// 更新联系人（含退订标记）。
#[utoipa::path(
    put,
    path = "/v1/contacts/{id}",
    tag = "Contacts",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "联系人 ID")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "联系人已更新", body = serde_json::Value),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "联系人不存在", body = crate::api::ApiError)
    )
)]
async fn update_contact(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(upd): Json<ContactUpdate>,
) -> impl IntoResponse {
    match state.store.update_contact(&claims.sub, &id, &upd).await {
        Ok(Some(c)) => success_response(StatusCode::OK, &trace_id, c),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Contact not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update contact");
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

/// 删除联系人。
#[utoipa::path(
    delete,
    path = "/v1/contacts/{id}",
    tag = "Contacts",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "联系人 ID")),
    responses(
        (status = 200, description = "联系人已删除"),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "联系人不存在", body = crate::api::ApiError)
    )
)]
async fn delete_contact(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_contact(&claims.sub, &id).await {
        Ok(true) => {
            record_audit(&state, &claims.sub, "contact.delete", "contact", Some(&id), None).await;
            success_empty_response(StatusCode::OK, &trace_id, "Contact deleted")
        }
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Contact not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete contact");
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

pub fn contact_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_contacts, create_contact))
        .routes(routes!(import_contacts))
        .routes(routes!(update_contact, delete_contact))
}

#[cfg(test)]
mod tests {
    use super::normalized_phone;

    #[test]
    fn accepts_plus_prefixed_numbers() {
        assert_eq!(
            normalized_phone("+254 711 000 001").as_deref(),
            Some("+254711000001")
        );
        assert_eq!(normalized_phone("0711000001").as_deref(), Some("0711000001"));
    }

    #[test]
    fn rejects_short_or_non_numeric() {
        assert!(normalized_phone("12345").is_none());
        assert!(normalized_phone("call-me-maybe").is_none());
        assert!(normalized_phone("+2547a1000001").is_none());
    }
}
