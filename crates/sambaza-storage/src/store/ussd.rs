use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::ussd_menu::{self, Column as MenuCol, Entity as MenuEntity};
use crate::entities::ussd_session_log::{self, Column as LogCol, Entity as LogEntity};
use crate::store::Store;

/// USSD 菜单数据行。`menu_json` 为屏幕树定义。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UssdMenuRow {
    pub id: String,
    pub user_id: String,
    pub service_code: String,
    pub name: String,
    pub menu_json: String,
    pub survey_id: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// USSD 菜单更新请求
#[derive(Debug, Clone, Deserialize)]
pub struct UssdMenuUpdate {
    pub name: Option<String>,
    pub menu_json: Option<String>,
    pub survey_id: Option<Option<String>>,
    pub enabled: Option<bool>,
}

/// USSD 会话日志数据行（每次回调追加一行，无会话状态持久化）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UssdSessionLogRow {
    pub id: String,
    pub session_id: String,
    pub service_code: String,
    pub phone: String,
    pub input_text: String,
    pub response_text: String,
    pub screen: String,
    pub terminal: bool,
    pub created_at: DateTime<Utc>,
}

/// USSD 会话日志过滤条件
#[derive(Debug, Clone, Default)]
pub struct UssdSessionLogFilter {
    pub session_id_eq: Option<String>,
    pub phone_contains: Option<String>,
    pub terminal_eq: Option<bool>,
}

fn to_menu(m: ussd_menu::Model) -> UssdMenuRow {
    UssdMenuRow {
        id: m.id,
        user_id: m.user_id,
        service_code: m.service_code,
        name: m.name,
        menu_json: m.menu_json,
        survey_id: m.survey_id,
        enabled: m.enabled,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

fn to_log(m: ussd_session_log::Model) -> UssdSessionLogRow {
    UssdSessionLogRow {
        id: m.id,
        session_id: m.session_id,
        service_code: m.service_code,
        phone: m.phone,
        input_text: m.input_text,
        response_text: m.response_text,
        screen: m.screen,
        terminal: m.terminal,
        created_at: m.created_at.with_timezone(&Utc),
    }
}

impl Store {
    // ---- ussd_menus ----

    pub async fn insert_ussd_menu(&self, row: &UssdMenuRow) -> Result<UssdMenuRow> {
        let now = Utc::now().fixed_offset();
        let am = ussd_menu::ActiveModel {
            id: Set(row.id.clone()),
            user_id: Set(row.user_id.clone()),
            service_code: Set(row.service_code.clone()),
            name: Set(row.name.clone()),
            menu_json: Set(row.menu_json.clone()),
            survey_id: Set(row.survey_id.clone()),
            enabled: Set(row.enabled),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_menu(model))
    }

    pub async fn get_ussd_menu(&self, user_id: &str, id: &str) -> Result<Option<UssdMenuRow>> {
        let model = MenuEntity::find_by_id(id)
            .filter(MenuCol::UserId.eq(user_id))
            .one(self.db())
            .await?;
        Ok(model.map(to_menu))
    }

    /// 回调路径用：按服务代码取菜单（网关回调无登录态）
    pub async fn get_ussd_menu_by_service_code(
        &self,
        service_code: &str,
    ) -> Result<Option<UssdMenuRow>> {
        let model = MenuEntity::find()
            .filter(MenuCol::ServiceCode.eq(service_code))
            .one(self.db())
            .await?;
        Ok(model.map(to_menu))
    }

    pub async fn list_ussd_menus(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UssdMenuRow>> {
        let rows = MenuEntity::find()
            .filter(MenuCol::UserId.eq(user_id))
            .order_by(MenuCol::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_menu).collect())
    }

    pub async fn count_ussd_menus(&self, user_id: &str) -> Result<u64> {
        Ok(MenuEntity::find()
            .filter(MenuCol::UserId.eq(user_id))
            .count(self.db())
            .await?)
    }

    pub async fn update_ussd_menu(
        &self,
        user_id: &str,
        id: &str,
        upd: &UssdMenuUpdate,
    ) -> Result<Option<UssdMenuRow>> {
        let model = MenuEntity::find_by_id(id)
            .filter(MenuCol::UserId.eq(user_id))
            .one(self.db())
            .await?;
        if let Some(m) = model {
            let mut am: ussd_menu::ActiveModel = m.into();
            if let Some(ref name) = upd.name {
                am.name = Set(name.clone());
            }
            if let Some(ref json) = upd.menu_json {
                am.menu_json = Set(json.clone());
            }
            if let Some(ref survey) = upd.survey_id {
                am.survey_id = Set(survey.clone());
            }
            if let Some(en) = upd.enabled {
                am.enabled = Set(en);
            }
            am.updated_at = Set(Utc::now().fixed_offset());
            let updated = am.update(self.db()).await?;
            Ok(Some(to_menu(updated)))
        } else {
            Ok(None)
        }
    }

    pub async fn delete_ussd_menu(&self, user_id: &str, id: &str) -> Result<bool> {
        let res = MenuEntity::delete_many()
            .filter(MenuCol::Id.eq(id))
            .filter(MenuCol::UserId.eq(user_id))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }

    // ---- ussd_session_logs ----

    pub async fn insert_ussd_session_log(&self, row: &UssdSessionLogRow) -> Result<()> {
        let now = Utc::now().fixed_offset();
        let am = ussd_session_log::ActiveModel {
            id: Set(row.id.clone()),
            session_id: Set(row.session_id.clone()),
            service_code: Set(row.service_code.clone()),
            phone: Set(row.phone.clone()),
            input_text: Set(row.input_text.clone()),
            response_text: Set(row.response_text.clone()),
            screen: Set(row.screen.clone()),
            terminal: Set(row.terminal),
            created_at: Set(now),
        };
        am.insert(self.db()).await?;
        Ok(())
    }

    /// 会话日志按服务代码查询（调用方须先校验菜单归属）
    pub async fn list_ussd_session_logs(
        &self,
        service_code: &str,
        filter: &UssdSessionLogFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UssdSessionLogRow>> {
        let mut q = LogEntity::find().filter(LogCol::ServiceCode.eq(service_code));
        if let Some(ref v) = filter.session_id_eq {
            q = q.filter(LogCol::SessionId.eq(v.as_str()));
        }
        if let Some(ref v) = filter.phone_contains {
            q = q.filter(LogCol::Phone.contains(v.as_str()));
        }
        if let Some(t) = filter.terminal_eq {
            q = q.filter(LogCol::Terminal.eq(t));
        }
        let rows = q
            .order_by(LogCol::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_log).collect())
    }

    pub async fn count_ussd_session_logs(
        &self,
        service_code: &str,
        filter: &UssdSessionLogFilter,
    ) -> Result<u64> {
        let mut q = LogEntity::find().filter(LogCol::ServiceCode.eq(service_code));
        if let Some(ref v) = filter.session_id_eq {
            q = q.filter(LogCol::SessionId.eq(v.as_str()));
        }
        if let Some(ref v) = filter.phone_contains {
            q = q.filter(LogCol::Phone.contains(v.as_str()));
        }
        if let Some(t) = filter.terminal_eq {
            q = q.filter(LogCol::Terminal.eq(t));
        }
        Ok(q.count(self.db()).await?)
    }
}
