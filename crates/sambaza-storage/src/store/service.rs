use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::service::{self, Column as SvcCol, Entity as SvcEntity};
use crate::entities::service_activation::{self, Column as ActCol, Entity as ActEntity};
use crate::store::Store;

/// 服务目录条目数据行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRow {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 服务开通记录数据行
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceActivationRow {
    pub id: String,
    pub user_id: String,
    pub service_id: String,
    pub status: String,
    pub activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn to_service(m: service::Model) -> ServiceRow {
    ServiceRow {
        id: m.id,
        code: m.code,
        name: m.name,
        description: m.description,
        enabled: m.enabled,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

fn to_activation(m: service_activation::Model) -> ServiceActivationRow {
    ServiceActivationRow {
        id: m.id,
        user_id: m.user_id,
        service_id: m.service_id,
        status: m.status,
        activated_at: m.activated_at.map(|t| t.with_timezone(&Utc)),
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

impl Store {
    // ---- services (catalog) ----

    pub async fn insert_service(&self, row: &ServiceRow) -> Result<ServiceRow> {
        let now = Utc::now().fixed_offset();
        let am = service::ActiveModel {
            id: Set(row.id.clone()),
            code: Set(row.code.clone()),
            name: Set(row.name.clone()),
            description: Set(row.description.clone()),
            enabled: Set(row.enabled),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_service(model))
    }

    pub async fn list_services(&self) -> Result<Vec<ServiceRow>> {
        let rows = SvcEntity::find()
            .order_by(SvcCol::Code, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_service).collect())
    }

    pub async fn get_service_by_code(&self, code: &str) -> Result<Option<ServiceRow>> {
        let model = SvcEntity::find()
            .filter(SvcCol::Code.eq(code))
            .one(self.db())
            .await?;
        Ok(model.map(to_service))
    }

    pub async fn count_services(&self) -> Result<u64> {
        Ok(SvcEntity::find().count(self.db()).await?)
    }

    // ---- service_activations ----

    pub async fn insert_activation(
        &self,
        row: &ServiceActivationRow,
    ) -> Result<ServiceActivationRow> {
        let now = Utc::now().fixed_offset();
        let am = service_activation::ActiveModel {
            id: Set(row.id.clone()),
            user_id: Set(row.user_id.clone()),
            service_id: Set(row.service_id.clone()),
            status: Set(row.status.clone()),
            activated_at: Set(row.activated_at.map(|t| t.fixed_offset())),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_activation(model))
    }

    pub async fn get_activation(
        &self,
        user_id: &str,
        service_id: &str,
    ) -> Result<Option<ServiceActivationRow>> {
        let model = ActEntity::find()
            .filter(ActCol::UserId.eq(user_id))
            .filter(ActCol::ServiceId.eq(service_id))
            .one(self.db())
            .await?;
        Ok(model.map(to_activation))
    }

    pub async fn list_activations(&self, user_id: &str) -> Result<Vec<ServiceActivationRow>> {
        let rows = ActEntity::find()
            .filter(ActCol::UserId.eq(user_id))
            .order_by(ActCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_activation).collect())
    }

    pub async fn count_active_activations(&self, user_id: &str) -> Result<u64> {
        Ok(ActEntity::find()
            .filter(ActCol::UserId.eq(user_id))
            .filter(ActCol::Status.eq("active"))
            .count(self.db())
            .await?)
    }

    /// 状态切换（激活时写入 activated_at）
    pub async fn update_activation_status(
        &self,
        user_id: &str,
        id: &str,
        status: &str,
    ) -> Result<Option<ServiceActivationRow>> {
        let model = ActEntity::find_by_id(id)
            .filter(ActCol::UserId.eq(user_id))
            .one(self.db())
            .await?;
        if let Some(m) = model {
            let first_activation = m.activated_at.is_none() && status == "active";
            let mut am: service_activation::ActiveModel = m.into();
            am.status = Set(status.to_owned());
            if first_activation {
                am.activated_at = Set(Some(Utc::now().fixed_offset()));
            }
            am.updated_at = Set(Utc::now().fixed_offset());
            let updated = am.update(self.db()).await?;
            Ok(Some(to_activation(updated)))
        } else {
            Ok(None)
        }
    }
}
