use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::webhook_delivery::{self, Column as DelCol, Entity as DelEntity};
use crate::entities::webhook_endpoint::{self, Column as EpCol, Entity as EpEntity};
use crate::store::Store;

/// Webhook 端点数据行。`events` 为订阅事件类型列表（落库为 JSON 数组）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpointRow {
    pub id: String,
    pub user_id: String,
    pub url: String,
    pub description: Option<String>,
    #[serde(skip_serializing)]
    pub encrypted_secret: String,
    pub events: Vec<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEndpointRow {
    /// 端点是否订阅了该事件（空列表视为订阅全部）
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.events.is_empty() || self.events.iter().any(|e| e == event_type)
    }
}

/// Webhook 端点更新请求
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEndpointUpdate {
    pub url: Option<String>,
    pub description: Option<String>,
    pub events: Option<Vec<String>>,
    pub enabled: Option<bool>,
}

/// Webhook 投递日志数据行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDeliveryRow {
    pub id: String,
    pub endpoint_id: String,
    pub user_id: String,
    pub event_type: String,
    pub status: String,
    pub http_status_code: Option<i32>,
    pub request_body: Option<String>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Webhook 投递日志过滤条件
#[derive(Debug, Clone, Default)]
pub struct WebhookDeliveryFilter {
    pub endpoint_id: Option<String>,
    pub event_type: Option<String>,
    pub status: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

fn parse_events(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn to_endpoint(m: webhook_endpoint::Model) -> WebhookEndpointRow {
    WebhookEndpointRow {
        id: m.id,
        user_id: m.user_id,
        url: m.url,
        description: m.description,
        encrypted_secret: m.encrypted_secret,
        events: parse_events(&m.events),
        enabled: m.enabled,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

fn to_delivery(m: webhook_delivery::Model) -> WebhookDeliveryRow {
    WebhookDeliveryRow {
        id: m.id,
        endpoint_id: m.endpoint_id,
        user_id: m.user_id,
        event_type: m.event_type,
        status: m.status,
        http_status_code: m.http_status_code,
        request_body: m.request_body,
        response_body: m.response_body,
        error_message: m.error_message,
        duration_ms: m.duration_ms,
        retry_count: m.retry_count,
        created_at: m.created_at.with_timezone(&Utc),
    }
}

type DeliverySelect = sea_orm::Select<DelEntity>;

fn apply_delivery_filter(
    mut q: DeliverySelect,
    user_id: &str,
    filter: &WebhookDeliveryFilter,
) -> DeliverySelect {
    q = q.filter(DelCol::UserId.eq(user_id));
    if let Some(ref v) = filter.endpoint_id {
        q = q.filter(DelCol::EndpointId.eq(v.as_str()));
    }
    if let Some(ref v) = filter.event_type {
        q = q.filter(DelCol::EventType.eq(v.as_str()));
    }
    if let Some(ref v) = filter.status {
        q = q.filter(DelCol::Status.eq(v.as_str()));
    }
    if let Some(start) = filter.start_time {
        if let Some(dt) = DateTime::<Utc>::from_timestamp(start, 0) {
            q = q.filter(DelCol::CreatedAt.gte(dt.fixed_offset()));
        }
    }
    if let Some(end) = filter.end_time {
        if let Some(dt) = DateTime::<Utc>::from_timestamp(end, 0) {
            q = q.filter(DelCol::CreatedAt.lte(dt.fixed_offset()));
        }
    }
    q
}

impl Store {
    // ---- webhook_endpoints ----

    pub async fn insert_webhook_endpoint(
        &self,
        row: &WebhookEndpointRow,
    ) -> Result<WebhookEndpointRow> {
        let now = Utc::now().fixed_offset();
        let am = webhook_endpoint::ActiveModel {
            id: Set(row.id.clone()),
            user_id: Set(row.user_id.clone()),
            url: Set(row.url.clone()),
            description: Set(row.description.clone()),
            encrypted_secret: Set(row.encrypted_secret.clone()),
            events: Set(serde_json::to_string(&row.events)?),
            enabled: Set(row.enabled),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_endpoint(model))
    }

    pub async fn get_webhook_endpoint(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<WebhookEndpointRow>> {
        let model = EpEntity::find_by_id(id)
            .filter(EpCol::UserId.eq(user_id))
            .one(self.db())
            .await?;
        Ok(model.map(to_endpoint))
    }

    pub async fn list_webhook_endpoints(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WebhookEndpointRow>> {
        let rows = EpEntity::find()
            .filter(EpCol::UserId.eq(user_id))
            .order_by(EpCol::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_endpoint).collect())
    }

    pub async fn count_webhook_endpoints(&self, user_id: &str) -> Result<u64> {
        Ok(EpEntity::find()
            .filter(EpCol::UserId.eq(user_id))
            .count(self.db())
            .await?)
    }

    pub async fn update_webhook_endpoint(
        &self,
        user_id: &str,
        id: &str,
        upd: &WebhookEndpointUpdate,
    ) -> Result<Option<WebhookEndpointRow>> {
        let model = EpEntity::find_by_id(id)
            .filter(EpCol::UserId.eq(user_id))
            .one(self.db())
            .await?;
        if let Some(m) = model {
            let mut am: webhook_endpoint::ActiveModel = m.into();
            if let Some(ref url) = upd.url {
                am.url = Set(url.clone());
            }
            if let Some(ref desc) = upd.description {
                am.description = Set(Some(desc.clone()));
            }
            if let Some(ref events) = upd.events {
                am.events = Set(serde_json::to_string(events)?);
            }
            if let Some(en) = upd.enabled {
                am.enabled = Set(en);
            }
            am.updated_at = Set(Utc::now().fixed_offset());
            let updated = am.update(self.db()).await?;
            Ok(Some(to_endpoint(updated)))
        } else {
            Ok(None)
        }
    }

    pub async fn delete_webhook_endpoint(&self, user_id: &str, id: &str) -> Result<bool> {
        let res = EpEntity::delete_many()
            .filter(EpCol::Id.eq(id))
            .filter(EpCol::UserId.eq(user_id))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// 投递路径用：取某用户启用中的端点
    pub async fn list_enabled_webhook_endpoints(
        &self,
        user_id: &str,
    ) -> Result<Vec<WebhookEndpointRow>> {
        let rows = EpEntity::find()
            .filter(EpCol::UserId.eq(user_id))
            .filter(EpCol::Enabled.eq(true))
            .order_by(EpCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_endpoint).collect())
    }

    // ---- webhook_deliveries ----

    pub async fn insert_webhook_delivery(&self, log: &WebhookDeliveryRow) -> Result<()> {
        let now = Utc::now().fixed_offset();
        let am = webhook_delivery::ActiveModel {
            id: Set(log.id.clone()),
            endpoint_id: Set(log.endpoint_id.clone()),
            user_id: Set(log.user_id.clone()),
            event_type: Set(log.event_type.clone()),
            status: Set(log.status.clone()),
            http_status_code: Set(log.http_status_code),
            request_body: Set(log.request_body.clone()),
            response_body: Set(log.response_body.clone()),
            error_message: Set(log.error_message.clone()),
            duration_ms: Set(log.duration_ms),
            retry_count: Set(log.retry_count),
            created_at: Set(now),
        };
        am.insert(self.db()).await?;
        Ok(())
    }

    pub async fn list_webhook_deliveries(
        &self,
        user_id: &str,
        filter: &WebhookDeliveryFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WebhookDeliveryRow>> {
        let rows = apply_delivery_filter(DelEntity::find(), user_id, filter)
            .order_by(DelCol::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_delivery).collect())
    }

    pub async fn count_webhook_deliveries(
        &self,
        user_id: &str,
        filter: &WebhookDeliveryFilter,
    ) -> Result<u64> {
        Ok(apply_delivery_filter(DelEntity::find(), user_id, filter)
            .count(self.db())
            .await?)
    }

    pub async fn cleanup_webhook_deliveries(&self, retention_days: u32) -> Result<u64> {
        let cutoff = (Utc::now() - chrono::Duration::days(retention_days as i64)).fixed_offset();
        let res = DelEntity::delete_many()
            .filter(DelCol::CreatedAt.lt(cutoff))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected)
    }
}
