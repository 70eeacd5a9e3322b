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
use sambaza_common::types::{CampaignStatus, MessageType};
use sambaza_storage::store::{CampaignFilter, CampaignMessageRow, CampaignRow, CampaignUpdate};
use sambaza_webhook::{events, WebhookEvent};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Deserialize, ToSchema)]
struct CreateCampaignRequest {
    name: String,
    #[serde(default = "default_message_type")]
    message_type: String,
    sender_id: Option<String>,
    body: String,
    scheduled_at: Option<chrono::DateTime<Utc>>,
}

fn default_message_type() -> String {
    "sms".to_string()
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct CampaignListParams {
    /// 状态精确匹配（status__eq，可选）
    #[param(required = false)]
    #[serde(rename = "status__eq")]
    status_eq: Option<String>,
    /// 名称包含匹配（name__contains，可选）
    #[param(required = false)]
    #[serde(rename = "name__contains")]
    name_contains: Option<String>,
    /// 渠道精确匹配（message_type__eq，可选）
    #[param(required = false)]
    #[serde(rename = "message_type__eq")]
    message_type_eq: Option<String>,
}

/// 分页查询群发活动列表。
/// 默认排序：`created_at` 倒序；默认分页：`limit=20&offset=0`。
#[utoipa::path(
    get,
    path = "/v1/campaigns",
    tag = "Campaigns",
    security(("bearer_auth" = [])),
    params(CampaignListParams, PaginationParams),
    responses(
        (status = 200, description = "群发活动分页列表", body = Vec<serde_json::Value>),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn list_campaigns(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(params): Query<CampaignListParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let filter = CampaignFilter {
        status_eq: params.status_eq,
        name_contains: params.name_contains,
        message_type_eq: params.message_type_eq,
    };
    let total = match state.store.count_campaigns(&claims.sub, &filter).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count campaigns");
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
        .list_campaigns(&claims.sub, &filter, pagination.limit(), pagination.offset())
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
            tracing::error!(error = %e, "Failed to list campaigns");
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

/// 创建群发活动（初始状态 draft）。
#[utoipa::path(
    post,
    path = "/v1/campaigns",
    tag = "Campaigns",
    security(("bearer_auth" = [])),
    request_body = CreateCampaignRequest,
    responses(
        (status = 201, description = "群发活动已创建", body = serde_json::Value),
        (status = 400, description = "渠道类型无效", body = crate::api::ApiError),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn create_campaign(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateCampaignRequest>,
) -> impl IntoResponse {
    if req.name.is_empty() || req.body.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "name and body are required",
        )
        .into_response();
    }
    if req.message_type.parse::<MessageType>().is_err() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            &format!("Unknown message type: {}", req.message_type),
        )
        .into_response();
    }

    let row = CampaignRow {
        id: sambaza_common::id::next_id(),
        user_id: claims.sub.clone(),
        name: req.name,
        message_type: req.message_type,
        sender_id: req.sender_id,
        body: req.body,
        status: CampaignStatus::Draft.to_string(),
        recipient_count: 0,
        sent_count: 0,
        delivered_count: 0,
        failed_count: 0,
        cost: 0.0,
        scheduled_at: req.scheduled_at,
        started_at: None,
        completed_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.insert_campaign(&row).await {
        Ok(created) => {
            record_audit(
                &state,
                &claims.sub,
                "campaign.create",
                "campaign",
                Some(&created.id),
                Some(serde_json::json!({"name": created.name.clone()})),
            )
            .await;
            success_response(StatusCode::CREATED, &trace_id, created)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to create campaign");
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

/// 获取群发活动详情。
#[utoipa::path(
    get,
    path = "/v1/campaigns/{id}",
    tag = "Campaigns",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "活动 ID")),
    responses(
        (status = 200, description = "群发活动详情", body = serde_json::Value),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "活动不存在", body = crate::api::ApiError)
    )
)]
async fn get_campaign(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_campaign(&claims.sub, &id).await {
        Ok(Some(c)) => success_response(StatusCode::OK, &trace_id, c),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Campaign not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get campaign");
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

/// 更新群发活动（仅 draft 状态可改内容）。
#[utoipa::path(
    put,
    path = "/v1/campaigns/{id}",
    tag = "Campaigns",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "活动 ID")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "群发活动已更新", body = serde_json::Value),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "活动不存在", body = crate::api::ApiError),
        (status = 409, description = "活动已发出，不可编辑", body = crate::api::ApiError)
    )
)]
async fn update_campaign(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(upd): Json<CampaignUpdate>,
) -> impl IntoResponse {
    let existing = match state.store.get_campaign(&claims.sub, &id).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Campaign not found",
            )
            .into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get campaign");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response();
        }
    };
    if existing.status != CampaignStatus::Draft.to_string() {
        return error_response(
            StatusCode::CONFLICT,
            &trace_id,
            "not_editable",
            "Only draft campaigns can be edited",
        )
        .into_response();
    }
    if let Some(ref mt) = upd.message_type {
        if mt.parse::<MessageType>().is_err() {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "bad_request",
                &format!("Unknown message type: {mt}"),
            )
            .into_response();
        }
    }

    match state.store.update_campaign(&claims.sub, &id, &upd).await {
        Ok(Some(c)) => success_response(StatusCode::OK, &trace_id, c),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Campaign not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update campaign");
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

/// 删除群发活动（仅 draft 状态）。
#[utoipa::path(
    delete,
    path = "/v1/campaigns/{id}",
    tag = "Campaigns",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "活动 ID")),
    responses(
        (status = 200, description = "群发活动已删除"),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "活动不存在", body = crate::api::ApiError),
        (status = 409, description = "活动已发出，不可删除", body = crate::api::ApiError)
    )
)]
async fn delete_campaign(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_campaign(&claims.sub, &id).await {
        Ok(Some(c)) if c.status != CampaignStatus::Draft.to_string() => {
            return error_response(
                StatusCode::CONFLICT,
                &trace_id,
                "not_editable",
                "Only draft campaigns can be deleted",
            )
            .into_response();
        }
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Campaign not found",
            )
            .into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get campaign");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response();
        }
    }

    match state.store.delete_campaign(&claims.sub, &id).await {
        Ok(true) => {
            record_audit(&state, &claims.sub, "campaign.delete", "campaign", Some(&id), None).await;
            success_empty_response(StatusCode::OK, &trace_id, "Campaign deleted")
        }
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Campaign not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete campaign");
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

#[derive(Deserialize, ToSchema, Default)]
struct SendCampaignRequest {
    /// 显式收件人列表（sms/whatsapp 为手机号，email 为邮箱地址）
    #[serde(default)]
    recipients: Vec<String>,
    /// 从联系人分组取收件人（与 recipients 二选一；都缺省时取全部联系人）
    #[serde(default)]
    group_name: Option<String>,
}

/// 发出群发活动：落一条消息行/收件人，状态转 sending，后台批量发送。
/// 计数列由送达回执与 30 秒轮询两路覆盖写，后写覆盖先写。
#[utoipa::path(
    post,
    path = "/v1/campaigns/{id}/send",
    tag = "Campaigns",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "活动 ID")),
    request_body = SendCampaignRequest,
    responses(
        (status = 202, description = "活动已进入发送队列", body = serde_json::Value),
        (status = 400, description = "收件人为空", body = crate::api::ApiError),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "活动不存在", body = crate::api::ApiError),
        (status = 409, description = "活动已发出", body = crate::api::ApiError),
        (status = 503, description = "网关未配置", body = crate::api::ApiError)
    )
)]
async fn send_campaign(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SendCampaignRequest>,
) -> impl IntoResponse {
    let campaign = match state.store.get_campaign(&claims.sub, &id).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Campaign not found",
            )
            .into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get campaign");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response();
        }
    };

    let status: CampaignStatus = campaign.status.parse().unwrap_or(CampaignStatus::Draft);
    if !matches!(status, CampaignStatus::Draft | CampaignStatus::Queued) {
        return error_response(
            StatusCode::CONFLICT,
            &trace_id,
            "invalid_status",
            &format!("Campaign is already {}", campaign.status),
        )
        .into_response();
    }

    let message_type: MessageType = campaign.message_type.parse().unwrap_or(MessageType::Sms);
    match message_type {
        MessageType::Email => {
            if state.mailer.is_none() {
                return error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    &trace_id,
                    "gateway_not_configured",
                    "SMTP is not configured",
                )
                .into_response();
            }
        }
        _ => {
            if state.sms.is_none() {
                return error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    &trace_id,
                    "gateway_not_configured",
                    "SMS gateway is not configured",
                )
                .into_response();
            }
        }
    }

    // Resolve recipients: explicit list, else contact group, else all contacts.
    let recipients: Vec<String> = if !req.recipients.is_empty() {
        req.recipients
            .into_iter()
            .filter(|r| !r.trim().is_empty())
            .collect()
    } else {
        let contacts = match state
            .store
            .list_campaign_recipients(&claims.sub, req.group_name.as_deref())
            .await
        {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to resolve campaign recipients");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &trace_id,
                    "storage_error",
                    "Database error",
                )
                .into_response();
            }
        };
        match message_type {
            MessageType::Email => contacts.into_iter().filter_map(|c| c.email).collect(),
            _ => contacts.into_iter().map(|c| c.phone).collect(),
        }
    };

    if recipients.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "empty_recipients",
            "No recipients resolved for this campaign",
        )
        .into_response();
    }

    // One message row per recipient, all queued.
    let mut messages = Vec::with_capacity(recipients.len());
    for destination in &recipients {
        let row = CampaignMessageRow {
            id: sambaza_common::id::next_id(),
            campaign_id: campaign.id.clone(),
            user_id: claims.sub.clone(),
            phone: destination.clone(),
            gateway_message_id: None,
            status: "queued".to_string(),
            failure_reason: None,
            cost: 0.0,
            network_code: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        match state.store.insert_campaign_message(&row).await {
            Ok(inserted) => messages.push(inserted),
            Err(e) => {
                tracing::error!(error = %e, destination = %destination, "Failed to queue message");
            }
        }
    }

    let sending = match state
        .store
        .set_campaign_status(&campaign.id, "sending", Some(Utc::now()), None)
        .await
    {
        Ok(Some(c)) => c,
        _ => campaign.clone(),
    };
    if let Err(e) = state
        .store
        .overwrite_campaign_counters(
            &campaign.id,
            &sambaza_storage::store::DeliveryCounts {
                total: messages.len() as u64,
                queued: messages.len() as u64,
                ..Default::default()
            },
        )
        .await
    {
        tracing::error!(error = %e, "Failed to initialize campaign counters");
    }

    record_audit(
        &state,
        &claims.sub,
        "campaign.send",
        "campaign",
        Some(&campaign.id),
        Some(serde_json::json!({"recipients": messages.len()})),
    )
    .await;

    // Batch send runs in the background; the console polls the counters.
    let task_state = state.clone();
    let task_campaign = sending.clone();
    tokio::spawn(async move {
        dispatch_campaign(task_state, task_campaign, messages).await;
    });

    success_response(StatusCode::ACCEPTED, &trace_id, sending)
}

/// Batch-send all queued messages of a campaign through the configured
/// gateway, then refresh the denormalized counters.
async fn dispatch_campaign(state: AppState, campaign: CampaignRow, messages: Vec<CampaignMessageRow>) {
    let message_type: MessageType = campaign.message_type.parse().unwrap_or(MessageType::Sms);

    match message_type {
        MessageType::Email => {
            let Some(mailer) = state.mailer.clone() else { return };
            for msg in &messages {
                match mailer.send(&msg.phone, &campaign.name, &campaign.body).await {
                    // SMTP has no delivery reports; acceptance is terminal.
                    Ok(()) => {
                        if let Err(e) = state.store.set_message_status(&msg.id, "delivered").await {
                            tracing::error!(error = %e, "Failed to mark email delivered");
                        }
                    }
                    Err(e) => {
                        if let Err(err) = state.store.mark_message_failed(&msg.id, &e.to_string()).await
                        {
                            tracing::error!(error = %err, "Failed to mark email failed");
                        }
                    }
                }
            }
        }
        _ => {
            let Some(sms) = state.sms.clone() else { return };
            for chunk in messages.chunks(100) {
                let phones: Vec<String> = chunk.iter().map(|m| m.phone.clone()).collect();
                match sms
                    .send_with_retry(&phones, &campaign.body, campaign.sender_id.as_deref())
                    .await
                {
                    Ok(data) => {
                        for msg in chunk {
                            let recipient = data
                                .recipients
                                .iter()
                                .find(|r| r.number == msg.phone || r.number.ends_with(&msg.phone));
                            match recipient {
                                Some(r) if r.accepted() => {
                                    if let Err(e) = state
                                        .store
                                        .mark_message_sent(&msg.id, &r.message_id, r.cost_amount())
                                        .await
                                    {
                                        tracing::error!(error = %e, "Failed to mark message sent");
                                    }
                                }
                                Some(r) => {
                                    let reason = format!("gateway status {}: {}", r.status_code, r.status);
                                    let _ = state.store.mark_message_failed(&msg.id, &reason).await;
                                }
                                None => {
                                    let _ = state
                                        .store
                                        .mark_message_failed(&msg.id, "no gateway response for recipient")
                                        .await;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            campaign_id = %campaign.id,
                            error = %e,
                            "Campaign batch send failed"
                        );
                        for msg in chunk {
                            let _ = state.store.mark_message_failed(&msg.id, &e.to_string()).await;
                        }
                    }
                }
            }
        }
    }

    refresh_campaign_counters(&state, &campaign.id, &campaign.user_id).await;
}

/// Recompute counters from message rows, overwrite them, and finish the
/// campaign (plus webhook event) once every message is terminal.
pub async fn refresh_campaign_counters(state: &AppState, campaign_id: &str, user_id: &str) {
    let counts = match state.store.campaign_delivery_counts(campaign_id).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(campaign_id = %campaign_id, error = %e, "Failed to compute delivery counts");
            return;
        }
    };
    if let Err(e) = state
        .store
        .overwrite_campaign_counters(campaign_id, &counts)
        .await
    {
        tracing::error!(campaign_id = %campaign_id, error = %e, "Failed to overwrite counters");
        return;
    }

    if counts.is_settled() {
        match state
            .store
            .set_campaign_status(campaign_id, "completed", None, Some(Utc::now()))
            .await
        {
            Ok(Some(c)) if c.status == "completed" => {
                let event = WebhookEvent::new(
                    events::CAMPAIGN_COMPLETED,
                    serde_json::json!({
                        "campaign_id": c.id,
                        "name": c.name,
                        "delivered": counts.delivered,
                        "failed": counts.failed,
                        "cost": counts.cost,
                    }),
                );
                if let Err(e) = state.dispatcher.dispatch(user_id, &event).await {
                    tracing::error!(error = %e, "Failed to dispatch campaign.completed webhook");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(campaign_id = %campaign_id, error = %e, "Failed to complete campaign");
            }
        }
    }
}

/// 获取活动实时送达统计（直接从消息行汇总）。
#[utoipa::path(
    get,
    path = "/v1/campaigns/{id}/delivery",
    tag = "Campaigns",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "活动 ID")),
    responses(
        (status = 200, description = "送达统计", body = serde_json::Value),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "活动不存在", body = crate::api::ApiError)
    )
)]
async fn campaign_delivery(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_campaign(&claims.sub, &id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Campaign not found",
            )
            .into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get campaign");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response();
        }
    }

    match state.store.campaign_delivery_counts(&id).await {
        Ok(counts) => success_response(StatusCode::OK, &trace_id, counts),
        Err(e) => {
            tracing::error!(error = %e, "Failed to compute delivery counts");
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
struct MessageListParams {
    /// 消息状态精确匹配（status__eq，可选）
    #[param(required = false)]
    #[serde(rename = "status__eq")]
    status_eq: Option<String>,
}

/// 分页查询活动的消息明细。
#[utoipa::path(
    get,
    path = "/v1/campaigns/{id}/messages",
    tag = "Campaigns",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "活动 ID"), MessageListParams, PaginationParams),
    responses(
        (status = 200, description = "消息明细分页列表", body = Vec<serde_json::Value>),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn list_campaign_messages(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<MessageListParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let total = match state
        .store
        .count_campaign_messages(&claims.sub, &id, params.status_eq.as_deref())
        .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count campaign messages");
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
        .list_campaign_messages(
            &claims.sub,
            &id,
            params.status_eq.as_deref(),
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
            tracing::error!(error = %e, "Failed to list campaign messages");
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

pub fn campaign_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_campaigns, create_campaign))
        .routes(routes!(get_campaign, update_campaign, delete_campaign))
        .routes(routes!(send_campaign))
        .routes(routes!(campaign_delivery))
        .routes(routes!(list_campaign_messages))
}
