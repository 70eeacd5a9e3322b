use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::audit_log::{self, Column, Entity};
use crate::store::Store;

/// 审计日志数据行（追加写，不提供更新/删除）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogRow {
    pub id: String,
    pub user_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub detail_json: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 审计日志过滤条件
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub action_eq: Option<String>,
    pub resource_type_eq: Option<String>,
    pub resource_id_eq: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

fn to_row(m: audit_log::Model) -> AuditLogRow {
    AuditLogRow {
        id: m.id,
        user_id: m.user_id,
        action: m.action,
        resource_type: m.resource_type,
        resource_id: m.resource_id,
        detail_json: m.detail_json,
        ip_address: m.ip_address,
        created_at: m.created_at.with_timezone(&Utc),
    }
}

type AuditSelect = sea_orm::Select<Entity>;

fn apply_filter(mut q: AuditSelect, user_id: &str, filter: &AuditLogFilter) -> AuditSelect {
    q = q.filter(Column::UserId.eq(user_id));
    if let Some(ref v) = filter.action_eq {
        q = q.filter(Column::Action.eq(v.as_str()));
    }
    if let Some(ref v) = filter.resource_type_eq {
        q = q.filter(Column::ResourceType.eq(v.as_str()));
    }
    if let Some(ref v) = filter.resource_id_eq {
        q = q.filter(Column::ResourceId.eq(v.as_str()));
    }
    if let Some(start) = filter.start_time {
        if let Some(dt) = DateTime::<Utc>::from_timestamp(start, 0) {
            q = q.filter(Column::CreatedAt.gte(dt.fixed_offset()));
        }
    }
    if let Some(end) = filter.end_time {
        if let Some(dt) = DateTime::<Utc>::from_timestamp(end, 0) {
            q = q.filter(Column::CreatedAt.lte(dt.fixed_offset()));
        }
    }
    q
}

impl Store {
    pub async fn insert_audit_log(&self, row: &AuditLogRow) -> Result<()> {
        let now = Utc::now().fixed_offset();
        let am = audit_log::ActiveModel {
            id: Set(row.id.clone()),
            user_id: Set(row.user_id.clone()),
            action: Set(row.action.clone()),
            resource_type: Set(row.resource_type.clone()),
            resource_id: Set(row.resource_id.clone()),
            detail_json: Set(row.detail_json.clone()),
            ip_address: Set(row.ip_address.clone()),
            created_at: Set(now),
        };
        am.insert(self.db()).await?;
        Ok(())
    }

    pub async fn list_audit_logs(
        &self,
        user_id: &str,
        filter: &AuditLogFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AuditLogRow>> {
        let rows = apply_filter(Entity::find(), user_id, filter)
            .order_by(Column::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    pub async fn count_audit_logs(&self, user_id: &str, filter: &AuditLogFilter) -> Result<u64> {
        Ok(apply_filter(Entity::find(), user_id, filter)
            .count(self.db())
            .await?)
    }
}
