use anyhow::Result;
use chrono::Utc;
use sambaza_common::types::User;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
};

use crate::entities::user;
use crate::store::Store;

/// 用户数据行（与 `sambaza_common::types::User` 同构，便于 API 层直接复用）
pub type UserRow = User;

impl From<user::Model> for User {
    fn from(m: user::Model) -> Self {
        User {
            id: m.id,
            username: m.username,
            password_hash: m.password_hash,
            token_version: m.token_version,
            created_at: m.created_at.with_timezone(&Utc),
            updated_at: m.updated_at.with_timezone(&Utc),
        }
    }
}

impl Store {
    /// 开机建号用：新建账号并返回其 ID
    pub async fn create_user(&self, username: &str, password_hash: &str) -> Result<String> {
        let id = sambaza_common::id::next_id();
        let now = Utc::now().fixed_offset();
        user::ActiveModel {
            id: Set(id.clone()),
            username: Set(username.to_owned()),
            password_hash: Set(password_hash.to_owned()),
            token_version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await?;
        Ok(id)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db())
            .await?
            .map(User::from))
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(user::Entity::find_by_id(id)
            .one(self.db())
            .await?
            .map(User::from))
    }

    /// 改密并将 token_version +1，使已签发的 JWT 可被判旧
    pub async fn update_user_password_hash(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<bool> {
        let Some(found) = user::Entity::find_by_id(user_id).one(self.db()).await? else {
            return Ok(false);
        };
        let bumped = found.token_version + 1;
        let mut active: user::ActiveModel = found.into();
        active.password_hash = Set(password_hash.to_owned());
        active.token_version = Set(bumped);
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(self.db()).await?;
        Ok(true)
    }

    pub async fn count_users(&self) -> Result<u64> {
        Ok(user::Entity::find().count(self.db()).await?)
    }
}
