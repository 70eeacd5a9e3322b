use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::campaign::{self, Column as CampCol, Entity as CampEntity};
use crate::entities::campaign_message::{self, Column as MsgCol, Entity as MsgEntity};
use crate::store::Store;

/// 群发活动数据行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub message_type: String,
    pub sender_id: Option<String>,
    pub body: String,
    pub status: String,
    pub recipient_count: i64,
    pub sent_count: i64,
    pub delivered_count: i64,
    pub failed_count: i64,
    pub cost: f64,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 群发活动更新请求（仅草稿可改内容）
#[derive(Debug, Clone, Deserialize)]
pub struct CampaignUpdate {
    pub name: Option<String>,
    pub message_type: Option<String>,
    pub sender_id: Option<String>,
    pub body: Option<String>,
    pub scheduled_at: Option<Option<DateTime<Utc>>>,
}

/// 群发活动过滤条件
#[derive(Debug, Clone, Default)]
pub struct CampaignFilter {
    pub status_eq: Option<String>,
    pub name_contains: Option<String>,
    pub message_type_eq: Option<String>,
}

/// 单条外发消息数据行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignMessageRow {
    pub id: String,
    pub campaign_id: String,
    pub user_id: String,
    pub phone: String,
    pub gateway_message_id: Option<String>,
    pub status: String,
    pub failure_reason: Option<String>,
    pub cost: f64,
    pub network_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 送达统计（由消息行汇总，覆盖写回 campaign 计数列）
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DeliveryCounts {
    pub total: u64,
    pub queued: u64,
    pub sent: u64,
    pub delivered: u64,
    pub failed: u64,
    pub cost: f64,
}

impl DeliveryCounts {
    /// 所有消息均达终态（delivered/failed）时，活动可判定完成。
    pub fn is_settled(&self) -> bool {
        self.total > 0 && self.queued == 0 && self.sent == 0
    }
}

fn to_campaign(m: campaign::Model) -> CampaignRow {
    CampaignRow {
        id: m.id,
        user_id: m.user_id,
        name: m.name,
        message_type: m.message_type,
        sender_id: m.sender_id,
        body: m.body,
        status: m.status,
        recipient_count: m.recipient_count,
        sent_count: m.sent_count,
        delivered_count: m.delivered_count,
        failed_count: m.failed_count,
        cost: m.cost,
        scheduled_at: m.scheduled_at.map(|t| t.with_timezone(&Utc)),
        started_at: m.started_at.map(|t| t.with_timezone(&Utc)),
        completed_at: m.completed_at.map(|t| t.with_timezone(&Utc)),
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

fn to_message(m: campaign_message::Model) -> CampaignMessageRow {
    CampaignMessageRow {
        id: m.id,
        campaign_id: m.campaign_id,
        user_id: m.user_id,
        phone: m.phone,
        gateway_message_id: m.gateway_message_id,
        status: m.status,
        failure_reason: m.failure_reason,
        cost: m.cost,
        network_code: m.network_code,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

type CampaignSelect = sea_orm::Select<CampEntity>;

fn apply_filter(mut q: CampaignSelect, user_id: &str, filter: &CampaignFilter) -> CampaignSelect {
    q = q.filter(CampCol::UserId.eq(user_id));
    if let Some(ref s) = filter.status_eq {
        q = q.filter(CampCol::Status.eq(s.as_str()));
    }
    if let Some(ref s) = filter.name_contains {
        q = q.filter(CampCol::Name.contains(s.as_str()));
    }
    if let Some(ref t) = filter.message_type_eq {
        q = q.filter(CampCol::MessageType.eq(t.as_str()));
    }
    q
}

impl Store {
    // ---- campaigns ----

    pub async fn insert_campaign(&self, row: &CampaignRow) -> Result<CampaignRow> {
        let now = Utc::now().fixed_offset();
        let am = campaign::ActiveModel {
            id: Set(row.id.clone()),
            user_id: Set(row.user_id.clone()),
            name: Set(row.name.clone()),
            message_type: Set(row.message_type.clone()),
            sender_id: Set(row.sender_id.clone()),
            body: Set(row.body.clone()),
            status: Set(row.status.clone()),
            recipient_count: Set(row.recipient_count),
            sent_count: Set(row.sent_count),
            delivered_count: Set(row.delivered_count),
            failed_count: Set(row.failed_count),
            cost: Set(row.cost),
            scheduled_at: Set(row.scheduled_at.map(|t| t.fixed_offset())),
            started_at: Set(None),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_campaign(model))
    }

    pub async fn get_campaign(&self, user_id: &str, id: &str) -> Result<Option<CampaignRow>> {
        let model = CampEntity::find_by_id(id)
            .filter(CampCol::UserId.eq(user_id))
            .one(self.db())
            .await?;
        Ok(model.map(to_campaign))
    }

    pub async fn list_campaigns(
        &self,
        user_id: &str,
        filter: &CampaignFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CampaignRow>> {
        let rows = apply_filter(CampEntity::find(), user_id, filter)
            .order_by(CampCol::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_campaign).collect())
    }

    pub async fn count_campaigns(&self, user_id: &str, filter: &CampaignFilter) -> Result<u64> {
        Ok(apply_filter(CampEntity::find(), user_id, filter)
            .count(self.db())
            .await?)
    }

    pub async fn update_campaign(
        &self,
        user_id: &str,
        id: &str,
        upd: &CampaignUpdate,
    ) -> Result<Option<CampaignRow>> {
        let model = CampEntity::find_by_id(id)
            .filter(CampCol::UserId.eq(user_id))
            .one(self.db())
            .await?;
        if let Some(m) = model {
            let mut am: campaign::ActiveModel = m.into();
            if let Some(ref name) = upd.name {
                am.name = Set(name.clone());
            }
            if let Some(ref mt) = upd.message_type {
                am.message_type = Set(mt.clone());
            }
            if let Some(ref sid) = upd.sender_id {
                am.sender_id = Set(Some(sid.clone()));
            }
            if let Some(ref body) = upd.body {
                am.body = Set(body.clone());
            }
            if let Some(sched) = upd.scheduled_at {
                am.scheduled_at = Set(sched.map(|t| t.fixed_offset()));
            }
            am.updated_at = Set(Utc::now().fixed_offset());
            let updated = am.update(self.db()).await?;
            Ok(Some(to_campaign(updated)))
        } else {
            Ok(None)
        }
    }

    pub async fn delete_campaign(&self, user_id: &str, id: &str) -> Result<bool> {
        MsgEntity::delete_many()
            .filter(MsgCol::CampaignId.eq(id))
            .filter(MsgCol::UserId.eq(user_id))
            .exec(self.db())
            .await?;
        let res = CampEntity::delete_many()
            .filter(CampCol::Id.eq(id))
            .filter(CampCol::UserId.eq(user_id))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// 状态流转（不做用户过滤：调度器与回调路径持有可信 campaign_id）
    pub async fn set_campaign_status(
        &self,
        id: &str,
        status: &str,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<CampaignRow>> {
        let model = CampEntity::find_by_id(id).one(self.db()).await?;
        if let Some(m) = model {
            let mut am: campaign::ActiveModel = m.into();
            am.status = Set(status.to_owned());
            if let Some(t) = started_at {
                am.started_at = Set(Some(t.fixed_offset()));
            }
            if let Some(t) = completed_at {
                am.completed_at = Set(Some(t.fixed_offset()));
            }
            am.updated_at = Set(Utc::now().fixed_offset());
            let updated = am.update(self.db()).await?;
            Ok(Some(to_campaign(updated)))
        } else {
            Ok(None)
        }
    }

    /// 覆盖写入计数列。轮询与送达回执两条路径都会调用，后写覆盖先写。
    pub async fn overwrite_campaign_counters(
        &self,
        id: &str,
        counts: &DeliveryCounts,
    ) -> Result<()> {
        let model = CampEntity::find_by_id(id).one(self.db()).await?;
        if let Some(m) = model {
            let mut am: campaign::ActiveModel = m.into();
            am.recipient_count = Set(counts.total as i64);
            am.sent_count = Set((counts.sent + counts.delivered) as i64);
            am.delivered_count = Set(counts.delivered as i64);
            am.failed_count = Set(counts.failed as i64);
            am.cost = Set(counts.cost);
            am.updated_at = Set(Utc::now().fixed_offset());
            am.update(self.db()).await?;
        }
        Ok(())
    }

    /// 调度器用：跨用户取处于指定状态的活动
    pub async fn list_campaigns_by_status(&self, status: &str) -> Result<Vec<CampaignRow>> {
        let rows = CampEntity::find()
            .filter(CampCol::Status.eq(status))
            .order_by(CampCol::StartedAt, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_campaign).collect())
    }

    // ---- campaign_messages ----

    pub async fn insert_campaign_message(
        &self,
        row: &CampaignMessageRow,
    ) -> Result<CampaignMessageRow> {
        let now = Utc::now().fixed_offset();
        let am = campaign_message::ActiveModel {
            id: Set(row.id.clone()),
            campaign_id: Set(row.campaign_id.clone()),
            user_id: Set(row.user_id.clone()),
            phone: Set(row.phone.clone()),
            gateway_message_id: Set(row.gateway_message_id.clone()),
            status: Set(row.status.clone()),
            failure_reason: Set(row.failure_reason.clone()),
            cost: Set(row.cost),
            network_code: Set(row.network_code.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_message(model))
    }

    pub async fn list_campaign_messages(
        &self,
        user_id: &str,
        campaign_id: &str,
        status_eq: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CampaignMessageRow>> {
        let mut q = MsgEntity::find()
            .filter(MsgCol::CampaignId.eq(campaign_id))
            .filter(MsgCol::UserId.eq(user_id));
        if let Some(s) = status_eq {
            q = q.filter(MsgCol::Status.eq(s));
        }
        let rows = q
            .order_by(MsgCol::CreatedAt, Order::Asc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_message).collect())
    }

    pub async fn count_campaign_messages(
        &self,
        user_id: &str,
        campaign_id: &str,
        status_eq: Option<&str>,
    ) -> Result<u64> {
        let mut q = MsgEntity::find()
            .filter(MsgCol::CampaignId.eq(campaign_id))
            .filter(MsgCol::UserId.eq(user_id));
        if let Some(s) = status_eq {
            q = q.filter(MsgCol::Status.eq(s));
        }
        Ok(q.count(self.db()).await?)
    }

    /// 发送成功后写回网关消息 ID 与计费
    pub async fn mark_message_sent(
        &self,
        id: &str,
        gateway_message_id: &str,
        cost: f64,
    ) -> Result<()> {
        let model = MsgEntity::find_by_id(id).one(self.db()).await?;
        if let Some(m) = model {
            let mut am: campaign_message::ActiveModel = m.into();
            am.gateway_message_id = Set(Some(gateway_message_id.to_owned()));
            am.status = Set("sent".to_owned());
            am.cost = Set(cost);
            am.updated_at = Set(Utc::now().fixed_offset());
            am.update(self.db()).await?;
        }
        Ok(())
    }

    /// 直接设置消息状态（email 渠道没有回执，SMTP 接受即终态）
    pub async fn set_message_status(&self, id: &str, status: &str) -> Result<()> {
        let model = MsgEntity::find_by_id(id).one(self.db()).await?;
        if let Some(m) = model {
            let mut am: campaign_message::ActiveModel = m.into();
            am.status = Set(status.to_owned());
            am.updated_at = Set(Utc::now().fixed_offset());
            am.update(self.db()).await?;
        }
        Ok(())
    }

    pub async fn mark_message_failed(&self, id: &str, reason: &str) -> Result<()> {
        let model = MsgEntity::find_by_id(id).one(self.db()).await?;
        if let Some(m) = model {
            let mut am: campaign_message::ActiveModel = m.into();
            am.status = Set("failed".to_owned());
            am.failure_reason = Set(Some(reason.to_owned()));
            am.updated_at = Set(Utc::now().fixed_offset());
            am.update(self.db()).await?;
        }
        Ok(())
    }

    /// 送达回执按网关消息 ID 更新状态。返回命中的消息行。
    pub async fn update_message_by_gateway_id(
        &self,
        gateway_message_id: &str,
        status: &str,
        failure_reason: Option<&str>,
        network_code: Option<&str>,
    ) -> Result<Option<CampaignMessageRow>> {
        let model = MsgEntity::find()
            .filter(MsgCol::GatewayMessageId.eq(gateway_message_id))
            .one(self.db())
            .await?;
        if let Some(m) = model {
            let mut am: campaign_message::ActiveModel = m.into();
            am.status = Set(status.to_owned());
            if let Some(reason) = failure_reason {
                am.failure_reason = Set(Some(reason.to_owned()));
            }
            if let Some(code) = network_code {
                am.network_code = Set(Some(code.to_owned()));
            }
            am.updated_at = Set(Utc::now().fixed_offset());
            let updated = am.update(self.db()).await?;
            Ok(Some(to_message(updated)))
        } else {
            Ok(None)
        }
    }

    /// 从消息行汇总送达统计
    pub async fn campaign_delivery_counts(&self, campaign_id: &str) -> Result<DeliveryCounts> {
        let rows = MsgEntity::find()
            .filter(MsgCol::CampaignId.eq(campaign_id))
            .all(self.db())
            .await?;
        let mut counts = DeliveryCounts::default();
        for m in rows {
            counts.total += 1;
            counts.cost += m.cost;
            match m.status.as_str() {
                "queued" => counts.queued += 1,
                "sent" => counts.sent += 1,
                "delivered" => counts.delivered += 1,
                "failed" => counts.failed += 1,
                other => {
                    tracing::warn!(status = other, "Unknown campaign message status");
                }
            }
        }
        Ok(counts)
    }

    /// 仪表盘用：某用户自指定时间以来的消息量
    pub async fn count_messages_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(MsgEntity::find()
            .filter(MsgCol::UserId.eq(user_id))
            .filter(MsgCol::CreatedAt.gte(since.fixed_offset()))
            .count(self.db())
            .await?)
    }
}
