use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::mpesa_transaction::{self, Column, Entity};
use crate::store::Store;

/// M-Pesa 交易数据行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpesaTransactionRow {
    pub id: String,
    pub user_id: String,
    pub phone: String,
    pub amount: f64,
    pub account_reference: Option<String>,
    pub description: Option<String>,
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: Option<String>,
    pub status: String,
    pub result_code: Option<i32>,
    pub result_desc: Option<String>,
    pub mpesa_receipt: Option<String>,
    pub transaction_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// M-Pesa 交易过滤条件
#[derive(Debug, Clone, Default)]
pub struct MpesaTransactionFilter {
    pub status_eq: Option<String>,
    pub phone_contains: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

/// 支付结果回调更新（按 checkout_request_id 关联）
#[derive(Debug, Clone)]
pub struct MpesaCallbackUpdate {
    pub status: String,
    pub result_code: i32,
    pub result_desc: String,
    pub mpesa_receipt: Option<String>,
    pub transaction_date: Option<String>,
}

fn to_row(m: mpesa_transaction::Model) -> MpesaTransactionRow {
    MpesaTransactionRow {
        id: m.id,
        user_id: m.user_id,
        phone: m.phone,
        amount: m.amount,
        account_reference: m.account_reference,
        description: m.description,
        merchant_request_id: m.merchant_request_id,
        checkout_request_id: m.checkout_request_id,
        status: m.status,
        result_code: m.result_code,
        result_desc: m.result_desc,
        mpesa_receipt: m.mpesa_receipt,
        transaction_date: m.transaction_date,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

type TxSelect = sea_orm::Select<Entity>;

fn apply_filter(mut q: TxSelect, user_id: &str, filter: &MpesaTransactionFilter) -> TxSelect {
    q = q.filter(Column::UserId.eq(user_id));
    if let Some(ref v) = filter.status_eq {
        q = q.filter(Column::Status.eq(v.as_str()));
    }
    if let Some(ref v) = filter.phone_contains {
        q = q.filter(Column::Phone.contains(v.as_str()));
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
    pub async fn insert_mpesa_transaction(
        &self,
        row: &MpesaTransactionRow,
    ) -> Result<MpesaTransactionRow> {
        let now = Utc::now().fixed_offset();
        let am = mpesa_transaction::ActiveModel {
            id: Set(row.id.clone()),
            user_id: Set(row.user_id.clone()),
            phone: Set(row.phone.clone()),
            amount: Set(row.amount),
            account_reference: Set(row.account_reference.clone()),
            description: Set(row.description.clone()),
            merchant_request_id: Set(row.merchant_request_id.clone()),
            checkout_request_id: Set(row.checkout_request_id.clone()),
            status: Set(row.status.clone()),
            result_code: Set(row.result_code),
            result_desc: Set(row.result_desc.clone()),
            mpesa_receipt: Set(row.mpesa_receipt.clone()),
            transaction_date: Set(row.transaction_date.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_row(model))
    }

    pub async fn get_mpesa_transaction(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<MpesaTransactionRow>> {
        let model = Entity::find_by_id(id)
            .filter(Column::UserId.eq(user_id))
            .one(self.db())
            .await?;
        Ok(model.map(to_row))
    }

    pub async fn list_mpesa_transactions(
        &self,
        user_id: &str,
        filter: &MpesaTransactionFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MpesaTransactionRow>> {
        let rows = apply_filter(Entity::find(), user_id, filter)
            .order_by(Column::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    pub async fn count_mpesa_transactions(
        &self,
        user_id: &str,
        filter: &MpesaTransactionFilter,
    ) -> Result<u64> {
        Ok(apply_filter(Entity::find(), user_id, filter)
            .count(self.db())
            .await?)
    }

    /// 支付结果回调按 checkout_request_id 更新交易行。返回命中的行。
    pub async fn apply_mpesa_callback(
        &self,
        checkout_request_id: &str,
        upd: &MpesaCallbackUpdate,
    ) -> Result<Option<MpesaTransactionRow>> {
        let model = Entity::find()
            .filter(Column::CheckoutRequestId.eq(checkout_request_id))
            .one(self.db())
            .await?;
        if let Some(m) = model {
            let mut am: mpesa_transaction::ActiveModel = m.into();
            am.status = Set(upd.status.clone());
            am.result_code = Set(Some(upd.result_code));
            am.result_desc = Set(Some(upd.result_desc.clone()));
            am.mpesa_receipt = Set(upd.mpesa_receipt.clone());
            am.transaction_date = Set(upd.transaction_date.clone());
            am.updated_at = Set(Utc::now().fixed_offset());
            let updated = am.update(self.db()).await?;
            Ok(Some(to_row(updated)))
        } else {
            Ok(None)
        }
    }

    /// 仪表盘用：已完成交易金额合计
    pub async fn sum_completed_mpesa_amount(&self, user_id: &str) -> Result<f64> {
        let rows = Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Status.eq("completed"))
            .all(self.db())
            .await?;
        Ok(rows.iter().map(|m| m.amount).sum())
    }
}
