use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::api_key::{self, Column, Entity};
use crate::store::Store;

/// API 密钥数据行（key_hash / encrypted_key 不随 API 返回）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub key_prefix: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    #[serde(skip_serializing)]
    pub encrypted_key: Option<String>,
    pub enabled: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn to_row(m: api_key::Model) -> ApiKeyRow {
    ApiKeyRow {
        id: m.id,
        user_id: m.user_id,
        name: m.name,
        key_prefix: m.key_prefix,
        key_hash: m.key_hash,
        encrypted_key: m.encrypted_key,
        enabled: m.enabled,
        last_used_at: m.last_used_at.map(|t| t.with_timezone(&Utc)),
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

impl Store {
    pub async fn insert_api_key(&self, row: &ApiKeyRow) -> Result<ApiKeyRow> {
        let now = Utc::now().fixed_offset();
        let am = api_key::ActiveModel {
            id: Set(row.id.clone()),
            user_id: Set(row.user_id.clone()),
            name: Set(row.name.clone()),
            key_prefix: Set(row.key_prefix.clone()),
            key_hash: Set(row.key_hash.clone()),
            encrypted_key: Set(row.encrypted_key.clone()),
            enabled: Set(row.enabled),
            last_used_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_row(model))
    }

    pub async fn list_api_keys(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ApiKeyRow>> {
        let rows = Entity::find()
            .filter(Column::UserId.eq(user_id))
            .order_by(Column::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    pub async fn count_api_keys(&self, user_id: &str) -> Result<u64> {
        Ok(Entity::find()
            .filter(Column::UserId.eq(user_id))
            .count(self.db())
            .await?)
    }

    /// 按前缀查找启用中的密钥（认证路径：前缀索引缩小范围后再做 bcrypt 校验）
    pub async fn list_enabled_api_keys_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKeyRow>> {
        let rows = Entity::find()
            .filter(Column::KeyPrefix.eq(prefix))
            .filter(Column::Enabled.eq(true))
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    pub async fn touch_api_key_last_used(&self, id: &str) -> Result<()> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        if let Some(m) = model {
            let mut am: api_key::ActiveModel = m.into();
            am.last_used_at = Set(Some(Utc::now().fixed_offset()));
            am.update(self.db()).await?;
        }
        Ok(())
    }

    pub async fn set_api_key_enabled(
        &self,
        user_id: &str,
        id: &str,
        enabled: bool,
    ) -> Result<Option<ApiKeyRow>> {
        let model = Entity::find_by_id(id)
            .filter(Column::UserId.eq(user_id))
            .one(self.db())
            .await?;
        if let Some(m) = model {
            let mut am: api_key::ActiveModel = m.into();
            am.enabled = Set(enabled);
            am.updated_at = Set(Utc::now().fixed_offset());
            let updated = am.update(self.db()).await?;
            Ok(Some(to_row(updated)))
        } else {
            Ok(None)
        }
    }

    pub async fn delete_api_key(&self, user_id: &str, id: &str) -> Result<bool> {
        let res = Entity::delete_many()
            .filter(Column::Id.eq(id))
            .filter(Column::UserId.eq(user_id))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }
}
