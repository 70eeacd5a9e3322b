use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::survey::{self, Column as SurveyCol, Entity as SurveyEntity};
use crate::entities::survey_response::{self, Column as RespCol, Entity as RespEntity};
use crate::store::Store;

/// 问卷数据行。`questions_json` 为问题定义 JSON 数组。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub channel: String,
    pub questions_json: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 问卷更新请求
#[derive(Debug, Clone, Deserialize)]
pub struct SurveyUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub channel: Option<String>,
    pub questions_json: Option<String>,
    pub enabled: Option<bool>,
}

/// 问卷回答数据行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyResponseRow {
    pub id: String,
    pub survey_id: String,
    pub user_id: String,
    pub respondent_phone: String,
    pub answers_json: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

fn to_survey(m: survey::Model) -> SurveyRow {
    SurveyRow {
        id: m.id,
        user_id: m.user_id,
        title: m.title,
        description: m.description,
        channel: m.channel,
        questions_json: m.questions_json,
        enabled: m.enabled,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

fn to_response(m: survey_response::Model) -> SurveyResponseRow {
    SurveyResponseRow {
        id: m.id,
        survey_id: m.survey_id,
        user_id: m.user_id,
        respondent_phone: m.respondent_phone,
        answers_json: m.answers_json,
        completed: m.completed,
        created_at: m.created_at.with_timezone(&Utc),
    }
}

impl Store {
    // ---- surveys ----

    pub async fn insert_survey(&self, row: &SurveyRow) -> Result<SurveyRow> {
        let now = Utc::now().fixed_offset();
        let am = survey::ActiveModel {
            id: Set(row.id.clone()),
            user_id: Set(row.user_id.clone()),
            title: Set(row.title.clone()),
            description: Set(row.description.clone()),
            channel: Set(row.channel.clone()),
            questions_json: Set(row.questions_json.clone()),
            enabled: Set(row.enabled),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_survey(model))
    }

    pub async fn get_survey(&self, user_id: &str, id: &str) -> Result<Option<SurveyRow>> {
        let model = SurveyEntity::find_by_id(id)
            .filter(SurveyCol::UserId.eq(user_id))
            .one(self.db())
            .await?;
        Ok(model.map(to_survey))
    }

    /// 回调路径用：不限定租户取问卷（USSD 网关回调无登录态）
    pub async fn get_survey_unscoped(&self, id: &str) -> Result<Option<SurveyRow>> {
        let model = SurveyEntity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(to_survey))
    }

    pub async fn list_surveys(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SurveyRow>> {
        let rows = SurveyEntity::find()
            .filter(SurveyCol::UserId.eq(user_id))
            .order_by(SurveyCol::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_survey).collect())
    }

    pub async fn count_surveys(&self, user_id: &str) -> Result<u64> {
        Ok(SurveyEntity::find()
            .filter(SurveyCol::UserId.eq(user_id))
            .count(self.db())
            .await?)
    }

    pub async fn update_survey(
        &self,
        user_id: &str,
        id: &str,
        upd: &SurveyUpdate,
    ) -> Result<Option<SurveyRow>> {
        let model = SurveyEntity::find_by_id(id)
            .filter(SurveyCol::UserId.eq(user_id))
            .one(self.db())
            .await?;
        if let Some(m) = model {
            let mut am: survey::ActiveModel = m.into();
            if let Some(ref title) = upd.title {
                am.title = Set(title.clone());
            }
            if let Some(ref desc) = upd.description {
                am.description = Set(Some(desc.clone()));
            }
            if let Some(ref channel) = upd.channel {
                am.channel = Set(channel.clone());
            }
            if let Some(ref q) = upd.questions_json {
                am.questions_json = Set(q.clone());
            }
            if let Some(en) = upd.enabled {
                am.enabled = Set(en);
            }
            am.updated_at = Set(Utc::now().fixed_offset());
            let updated = am.update(self.db()).await?;
            Ok(Some(to_survey(updated)))
        } else {
            Ok(None)
        }
    }

    pub async fn delete_survey(&self, user_id: &str, id: &str) -> Result<bool> {
        RespEntity::delete_many()
            .filter(RespCol::SurveyId.eq(id))
            .filter(RespCol::UserId.eq(user_id))
            .exec(self.db())
            .await?;
        let res = SurveyEntity::delete_many()
            .filter(SurveyCol::Id.eq(id))
            .filter(SurveyCol::UserId.eq(user_id))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }

    // ---- survey_responses ----

    pub async fn insert_survey_response(
        &self,
        row: &SurveyResponseRow,
    ) -> Result<SurveyResponseRow> {
        let now = Utc::now().fixed_offset();
        let am = survey_response::ActiveModel {
            id: Set(row.id.clone()),
            survey_id: Set(row.survey_id.clone()),
            user_id: Set(row.user_id.clone()),
            respondent_phone: Set(row.respondent_phone.clone()),
            answers_json: Set(row.answers_json.clone()),
            completed: Set(row.completed),
            created_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_response(model))
    }

    pub async fn list_survey_responses(
        &self,
        user_id: &str,
        survey_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SurveyResponseRow>> {
        let rows = RespEntity::find()
            .filter(RespCol::SurveyId.eq(survey_id))
            .filter(RespCol::UserId.eq(user_id))
            .order_by(RespCol::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_response).collect())
    }

    pub async fn count_survey_responses(&self, user_id: &str, survey_id: &str) -> Result<u64> {
        Ok(RespEntity::find()
            .filter(RespCol::SurveyId.eq(survey_id))
            .filter(RespCol::UserId.eq(user_id))
            .count(self.db())
            .await?)
    }

    /// 统计用：取全部回答行（问卷规模有限，直接在内存中做直方图）
    pub async fn list_all_survey_responses(
        &self,
        user_id: &str,
        survey_id: &str,
    ) -> Result<Vec<SurveyResponseRow>> {
        let rows = RespEntity::find()
            .filter(RespCol::SurveyId.eq(survey_id))
            .filter(RespCol::UserId.eq(user_id))
            .order_by(RespCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_response).collect())
    }
}
