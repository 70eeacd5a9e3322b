use crate::api::{error_response, success_response};
use crate::auth::Claims;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{Duration, Utc};
use sambaza_storage::store::{CampaignFilter, ContactFilter, TicketFilter};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// 仪表盘概览
#[derive(Serialize, ToSchema)]
struct DashboardOverview {
    /// 活动总数
    campaign_count: u64,
    /// 发送中的活动数
    sending_campaign_count: u64,
    /// 联系人总数
    contact_count: u64,
    /// 近 24 小时消息量
    messages_last_24h: u64,
    /// 已开通服务数
    active_service_count: u64,
    /// M-Pesa 已完成收款总额
    mpesa_completed_amount: f64,
    /// 待处理工单数
    open_ticket_count: u64,
}

/// 仪表盘概览（当前用户名下的聚合计数）。
#[utoipa::path(
    get,
    path = "/v1/dashboard/overview",
    tag = "Dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "仪表盘概览", body = DashboardOverview),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn overview(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let user_id = &claims.sub;

    let result: anyhow::Result<DashboardOverview> = async {
        let campaign_count = state
            .store
            .count_campaigns(user_id, &CampaignFilter::default())
            .await?;
        let sending_campaign_count = state
            .store
            .count_campaigns(
                user_id,
                &CampaignFilter {
                    status_eq: Some("sending".to_string()),
                    ..Default::default()
                },
            )
            .await?;
        let contact_count = state
            .store
            .count_contacts(user_id, &ContactFilter::default())
            .await?;
        let messages_last_24h = state
            .store
            .count_messages_since(user_id, Utc::now() - Duration::hours(24))
            .await?;
        let active_service_count = state.store.count_active_activations(user_id).await?;
        let mpesa_completed_amount = state.store.sum_completed_mpesa_amount(user_id).await?;
        let open_ticket_count = state
            .store
            .count_tickets(
                user_id,
                &TicketFilter {
                    status_eq: Some("open".to_string()),
                    ..Default::default()
                },
            )
            .await?;

        Ok(DashboardOverview {
            campaign_count,
            sending_campaign_count,
            contact_count,
            messages_last_24h,
            active_service_count,
            mpesa_completed_amount,
            open_ticket_count,
        })
    }
    .await;

    match result {
        Ok(overview) => success_response(StatusCode::OK, &trace_id, overview),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build dashboard overview");
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

pub fn dashboard_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(overview))
}
