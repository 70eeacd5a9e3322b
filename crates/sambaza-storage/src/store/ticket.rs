use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::ticket::{self, Column, Entity};
use crate::store::Store;

/// 服务台工单数据行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRow {
    pub id: String,
    pub user_id: String,
    pub subject: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub assignee: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 工单更新请求
#[derive(Debug, Clone, Deserialize)]
pub struct TicketUpdate {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<Option<String>>,
}

/// 工单过滤条件
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status_eq: Option<String>,
    pub priority_eq: Option<String>,
    pub subject_contains: Option<String>,
}

fn to_row(m: ticket::Model) -> TicketRow {
    TicketRow {
        id: m.id,
        user_id: m.user_id,
        subject: m.subject,
        description: m.description,
        status: m.status,
        priority: m.priority,
        assignee: m.assignee,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

type TicketSelect = sea_orm::Select<Entity>;

fn apply_filter(mut q: TicketSelect, user_id: &str, filter: &TicketFilter) -> TicketSelect {
    q = q.filter(Column::UserId.eq(user_id));
    if let Some(ref v) = filter.status_eq {
        q = q.filter(Column::Status.eq(v.as_str()));
    }
    if let Some(ref v) = filter.priority_eq {
        q = q.filter(Column::Priority.eq(v.as_str()));
    }
    if let Some(ref v) = filter.subject_contains {
        q = q.filter(Column::Subject.contains(v.as_str()));
    }
    q
}

impl Store {
    pub async fn insert_ticket(&self, row: &TicketRow) -> Result<TicketRow> {
        let now = Utc::now().fixed_offset();
        let am = ticket::ActiveModel {
            id: Set(row.id.clone()),
            user_id: Set(row.user_id.clone()),
            subject: Set(row.subject.clone()),
            description: Set(row.description.clone()),
            status: Set(row.status.clone()),
            priority: Set(row.priority.clone()),
            assignee: Set(row.assignee.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_row(model))
    }

    pub async fn get_ticket(&self, user_id: &str, id: &str) -> Result<Option<TicketRow>> {
        let model = Entity::find_by_id(id)
            .filter(Column::UserId.eq(user_id))
            .one(self.db())
            .await?;
        Ok(model.map(to_row))
    }

    pub async fn list_tickets(
        &self,
        user_id: &str,
        filter: &TicketFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TicketRow>> {
        let rows = apply_filter(Entity::find(), user_id, filter)
            .order_by(Column::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    pub async fn count_tickets(&self, user_id: &str, filter: &TicketFilter) -> Result<u64> {
        Ok(apply_filter(Entity::find(), user_id, filter)
            .count(self.db())
            .await?)
    }

    pub async fn update_ticket(
        &self,
        user_id: &str,
        id: &str,
        upd: &TicketUpdate,
    ) -> Result<Option<TicketRow>> {
        let model = Entity::find_by_id(id)
            .filter(Column::UserId.eq(user_id))
            .one(self.db())
            .await?;
        if let Some(m) = model {
            let mut am: ticket::ActiveModel = m.into();
            if let Some(ref subject) = upd.subject {
                am.subject = Set(subject.clone());
            }
            if let Some(ref desc) = upd.description {
                am.description = Set(desc.clone());
            }
            if let Some(ref status) = upd.status {
                am.status = Set(status.clone());
            }
            if let Some(ref priority) = upd.priority {
                am.priority = Set(priority.clone());
            }
            if let Some(ref assignee) = upd.assignee {
                am.assignee = Set(assignee.clone());
            }
            am.updated_at = Set(Utc::now().fixed_offset());
            let updated = am.update(self.db()).await?;
            Ok(Some(to_row(updated)))
        } else {
            Ok(None)
        }
    }

    pub async fn delete_ticket(&self, user_id: &str, id: &str) -> Result<bool> {
        let res = Entity::delete_many()
            .filter(Column::Id.eq(id))
            .filter(Column::UserId.eq(user_id))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }
}
