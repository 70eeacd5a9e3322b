use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::contact::{self, Column, Entity};
use crate::store::Store;

/// 联系人数据行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRow {
    pub id: String,
    pub user_id: String,
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub group_name: Option<String>,
    pub opted_out: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 联系人更新请求
#[derive(Debug, Clone, Deserialize)]
pub struct ContactUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub group_name: Option<String>,
    pub opted_out: Option<bool>,
}

/// 联系人过滤条件
#[derive(Debug, Clone, Default)]
pub struct ContactFilter {
    pub phone_contains: Option<String>,
    pub group_name_eq: Option<String>,
    pub opted_out_eq: Option<bool>,
}

fn to_row(m: contact::Model) -> ContactRow {
    ContactRow {
        id: m.id,
        user_id: m.user_id,
        phone: m.phone,
        name: m.name,
        email: m.email,
        group_name: m.group_name,
        opted_out: m.opted_out,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

type ContactSelect = sea_orm::Select<Entity>;

fn apply_filter(mut q: ContactSelect, user_id: &str, filter: &ContactFilter) -> ContactSelect {
    q = q.filter(Column::UserId.eq(user_id));
    if let Some(ref s) = filter.phone_contains {
        q = q.filter(Column::Phone.contains(s.as_str()));
    }
    if let Some(ref g) = filter.group_name_eq {
        q = q.filter(Column::GroupName.eq(g.as_str()));
    }
    if let Some(o) = filter.opted_out_eq {
        q = q.filter(Column::OptedOut.eq(o));
    }
    q
}

impl Store {
    pub async fn insert_contact(&self, row: &ContactRow) -> Result<ContactRow> {
        let now = Utc::now().fixed_offset();
        let am = contact::ActiveModel {
            id: Set(row.id.clone()),
            user_id: Set(row.user_id.clone()),
            phone: Set(row.phone.clone()),
            name: Set(row.name.clone()),
            email: Set(row.email.clone()),
            group_name: Set(row.group_name.clone()),
            opted_out: Set(row.opted_out),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_row(model))
    }

    pub async fn get_contact(&self, user_id: &str, id: &str) -> Result<Option<ContactRow>> {
        let model = Entity::find_by_id(id)
            .filter(Column::UserId.eq(user_id))
            .one(self.db())
            .await?;
        Ok(model.map(to_row))
    }

    pub async fn list_contacts(
        &self,
        user_id: &str,
        filter: &ContactFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ContactRow>> {
        let rows = apply_filter(Entity::find(), user_id, filter)
            .order_by(Column::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    pub async fn count_contacts(&self, user_id: &str, filter: &ContactFilter) -> Result<u64> {
        Ok(apply_filter(Entity::find(), user_id, filter)
            .count(self.db())
            .await?)
    }

    pub async fn update_contact(
        &self,
        user_id: &str,
        id: &str,
        upd: &ContactUpdate,
    ) -> Result<Option<ContactRow>> {
        let model = Entity::find_by_id(id)
            .filter(Column::UserId.eq(user_id))
            .one(self.db())
            .await?;
        if let Some(m) = model {
            let mut am: contact::ActiveModel = m.into();
            if let Some(ref name) = upd.name {
                am.name = Set(Some(name.clone()));
            }
            if let Some(ref email) = upd.email {
                am.email = Set(Some(email.clone()));
            }
            if let Some(ref group) = upd.group_name {
                am.group_name = Set(Some(group.clone()));
            }
            if let Some(o) = upd.opted_out {
                am.opted_out = Set(o);
            }
            am.updated_at = Set(Utc::now().fixed_offset());
            let updated = am.update(self.db()).await?;
            Ok(Some(to_row(updated)))
        } else {
            Ok(None)
        }
    }

    pub async fn delete_contact(&self, user_id: &str, id: &str) -> Result<bool> {
        let res = Entity::delete_many()
            .filter(Column::Id.eq(id))
            .filter(Column::UserId.eq(user_id))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// 取某分组（或全部）未退订的联系人，作为群发收件人
    pub async fn list_campaign_recipients(
        &self,
        user_id: &str,
        group_name: Option<&str>,
    ) -> Result<Vec<ContactRow>> {
        let mut q = Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::OptedOut.eq(false));
        if let Some(g) = group_name {
            q = q.filter(Column::GroupName.eq(g));
        }
        let rows = q
            .order_by(Column::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }
}
