use crate::api::pagination::PaginationParams;
use crate::api::{
    error_response, record_audit, success_empty_response, success_paginated_response,
    success_response,
};
use crate::auth::Claims;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use sambaza_storage::store::{SurveyRow, SurveyUpdate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// 问卷问题定义（questions_json 数组元素）
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SurveyQuestion {
    /// 问题标识（回答 JSON 的键）
    pub id: String,
    /// 问题文本
    pub text: String,
    /// 可选项（自由作答时为空）
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
struct CreateSurveyRequest {
    title: String,
    description: Option<String>,
    #[serde(default = "default_channel")]
    channel: String,
    #[serde(default)]
    questions: Vec<SurveyQuestion>,
}

fn default_channel() -> String {
    "ussd".to_string()
}

fn validate_questions(questions: &[SurveyQuestion]) -> Result<(), String> {
    let mut seen = std::collections::HashSet::new();
    for q in questions {
        if q.id.trim().is_empty() || q.text.trim().is_empty() {
            return Err("question id and text are required".to_string());
        }
        if !seen.insert(q.id.clone()) {
            return Err(format!("duplicate question id: {}", q.id));
        }
    }
    Ok(())
}

/// 分页查询问卷列表。
#[utoipa::path(
    get,
    path = "/v1/surveys",
    tag = "Surveys",
    security(("bearer_auth" = [])),
    params(PaginationParams),
    responses(
        (status = 200, description = "问卷分页列表", body = Vec<serde_json::Value>),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn list_surveys(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let total = match state.store.count_surveys(&claims.sub).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count surveys");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response();
        }
    };
    match state
        .store
        .list_surveys(&claims.sub, pagination.limit(), pagination.offset())
        .await
    {
        Ok(items) => success_paginated_response(
            StatusCode::OK,
            &trace_id,
            items,
            total,
            pagination.limit(),
            pagination.offset(),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list surveys");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response()
        }
    }
}

/// 创建问卷。
#[utoipa::path(
    post,
    path = "/v1/surveys",
    tag = "Surveys",
    security(("bearer_auth" = [])),
    request_body = CreateSurveyRequest,
    responses(
        (status = 201, description = "问卷已创建", body = serde_json::Value),
        (status = 400, description = "问题定义无效", body = crate::api::ApiError),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn create_survey(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateSurveyRequest>,
) -> impl IntoResponse {
    if req.title.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "title is required",
        )
        .into_response();
    }
    if let Err(msg) = validate_questions(&req.questions) {
        return error_response(StatusCode::BAD_REQUEST, &trace_id, "invalid_questions", &msg)
            .into_response();
    }

    let questions_json = match serde_json::to_string(&req.questions) {
        Ok(j) => j,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize questions");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "internal error",
            )
            .into_response();
        }
    };

    let row = SurveyRow {
        id: sambaza_common::id::next_id(),
        user_id: claims.sub.clone(),
        title: req.title,
        description: req.description,
        channel: req.channel,
        questions_json,
        enabled: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    match state.store.insert_survey(&row).await {
        Ok(created) => {
            record_audit(&state, &claims.sub, "survey.create", "survey", Some(&created.id), None)
                .await;
            success_response(StatusCode::CREATED, &trace_id, created)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to create survey");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response()
        }
    }
}

/// 获取问卷详情。
#[utoipa::path(
    get,
    path = "/v1/surveys/{id}",
    tag = "Surveys",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "问卷 ID")),
    responses(
        (status = 200, description = "问卷详情", body = serde_json::Value),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "问卷不存在", body = crate::api::ApiError)
    )
)]
async fn get_survey(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_survey(&claims.sub, &id).await {
        Ok(Some(s)) => success_response(StatusCode::OK, &trace_id, s),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Survey not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get survey");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response()
        }
    }
}

/// 更新问卷。questions_json 必须可解析为问题数组。
#[utoipa::path(
    put,
    path = "/v1/surveys/{id}",
    tag = "Surveys",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "问卷 ID")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "问卷已更新", body = serde_json::Value),
        (status = 400, description = "问题定义无效", body = crate::api::ApiError),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "问卷不存在", body = crate::api::ApiError)
    )
)]
async fn update_survey(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(upd): Json<SurveyUpdate>,
) -> impl IntoResponse {
    if let Some(ref raw) = upd.questions_json {
        match serde_json::from_str::<Vec<SurveyQuestion>>(raw) {
            Ok(questions) => {
                if let Err(msg) = validate_questions(&questions) {
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        &trace_id,
                        "invalid_questions",
                        &msg,
                    )
                    .into_response();
                }
            }
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &trace_id,
                    "invalid_questions",
                    &format!("questions_json is not a question array: {e}"),
                )
                .into_response();
            }
        }
    }

    match state.store.update_survey(&claims.sub, &id, &upd).await {
        Ok(Some(s)) => success_response(StatusCode::OK, &trace_id, s),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Survey not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update survey");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response()
        }
    }
}

/// 删除问卷（连带回答）。
#[utoipa::path(
    delete,
    path = "/v1/surveys/{id}",
    tag = "Surveys",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "问卷 ID")),
    responses(
        (status = 200, description = "问卷已删除"),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "问卷不存在", body = crate::api::ApiError)
    )
)]
async fn delete_survey(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_survey(&claims.sub, &id).await {
        Ok(true) => {
            record_audit(&state, &claims.sub, "survey.delete", "survey", Some(&id), None).await;
            success_empty_response(StatusCode::OK, &trace_id, "Survey deleted")
        }
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Survey not found",
        )
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete survey");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response()
        }
    }
}

/// 分页查询问卷回答。
#[utoipa::path(
    get,
    path = "/v1/surveys/{id}/responses",
    tag = "Surveys",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "问卷 ID"), PaginationParams),
    responses(
        (status = 200, description = "回答分页列表", body = Vec<serde_json::Value>),
        (status = 401, description = "未认证", body = crate::api::ApiError)
    )
)]
async fn list_survey_responses(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let total = match state.store.count_survey_responses(&claims.sub, &id).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count survey responses");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response();
        }
    };
    match state
        .store
        .list_survey_responses(&claims.sub, &id, pagination.limit(), pagination.offset())
        .await
    {
        Ok(items) => success_paginated_response(
            StatusCode::OK,
            &trace_id,
            items,
            total,
            pagination.limit(),
            pagination.offset(),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list survey responses");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response()
        }
    }
}

/// 问卷统计
#[derive(Serialize, ToSchema)]
struct SurveyStats {
    response_count: u64,
    /// 每题答案直方图：question id -> (answer -> count)
    answers: HashMap<String, HashMap<String, u64>>,
}

/// 问卷回答统计（逐题答案直方图，在内存中汇总）。
#[utoipa::path(
    get,
    path = "/v1/surveys/{id}/stats",
    tag = "Surveys",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "问卷 ID")),
    responses(
        (status = 200, description = "问卷统计", body = SurveyStats),
        (status = 401, description = "未认证", body = crate::api::ApiError),
        (status = 404, description = "问卷不存在", body = crate::api::ApiError)
    )
)]
async fn survey_stats(
    Extension(trace_id): Extension<TraceId>,
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_survey(&claims.sub, &id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Survey not found",
            )
            .into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get survey");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response();
        }
    }

    let responses = match state.store.list_all_survey_responses(&claims.sub, &id).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load survey responses");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
            .into_response();
        }
    };

    let mut answers: HashMap<String, HashMap<String, u64>> = HashMap::new();
    for response in &responses {
        let parsed: HashMap<String, serde_json::Value> =
            serde_json::from_str(&response.answers_json).unwrap_or_default();
        for (question_id, answer) in parsed {
            let answer_text = match answer {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            *answers
                .entry(question_id)
                .or_default()
                .entry(answer_text)
                .or_default() += 1;
        }
    }

    success_response(
        StatusCode::OK,
        &trace_id,
        SurveyStats {
            response_count: responses.len() as u64,
            answers,
        },
    )
}

pub fn survey_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_surveys, create_survey))
        .routes(routes!(get_survey, update_survey, delete_survey))
        .routes(routes!(list_survey_responses))
        .routes(routes!(survey_stats))
}

#[cfg(test)]
mod tests {
    use super::{validate_questions, SurveyQuestion};

    #[test]
    fn rejects_duplicate_question_ids() {
        let questions = vec![
            SurveyQuestion {
                id: "q1".to_string(),
                text: "How was the service?".to_string(),
                options: vec!["Good".to_string(), "Bad".to_string()],
            },
            SurveyQuestion {
                id: "q1".to_string(),
                text: "Again?".to_string(),
                options: vec![],
            },
        ];
        assert!(validate_questions(&questions).is_err());
    }

    #[test]
    fn rejects_empty_id_or_text() {
        let questions = vec![SurveyQuestion {
            id: " ".to_string(),
            text: "x".to_string(),
            options: vec![],
        }];
        assert!(validate_questions(&questions).is_err());
        assert!(validate_questions(&[]).is_ok());
    }
}
