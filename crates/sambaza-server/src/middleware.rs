use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::error_response;
use crate::auth::{validate_token, Claims};
use crate::logging::TraceId;
use crate::state::AppState;

/// Custom header name for console client identification.
static SBZ_CLIENT_ID_HEADER: HeaderName = HeaderName::from_static("sbz-client-id");

/// Header carrying a programmatic API key on messaging routes.
static API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

/// Middleware that validates the `sbz-client-id` request header.
///
/// When `require_client_id` is `true` in config, requests without a valid
/// `sbz-client-id` header are rejected with 403 Forbidden.
/// When `require_client_id` is `false`, the middleware passes through all requests.
pub async fn client_id_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // If feature is disabled, pass through
    if !state.config.client_id.require_client_id {
        return next.run(req).await;
    }

    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let client_id = req
        .headers()
        .get(&SBZ_CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok());

    match client_id {
        None => {
            tracing::warn!(
                trace_id = %trace_id,
                "Request rejected: missing sbz-client-id header"
            );
            error_response(
                StatusCode::FORBIDDEN,
                &trace_id,
                "client_id_missing",
                "missing sbz-client-id header",
            )
        }
        Some("") => {
            tracing::warn!(
                trace_id = %trace_id,
                "Request rejected: empty sbz-client-id header"
            );
            error_response(
                StatusCode::FORBIDDEN,
                &trace_id,
                "client_id_missing",
                "sbz-client-id header cannot be empty",
            )
        }
        Some(id) => {
            // If allowed_client_ids is empty, accept any non-empty value
            if !state.config.client_id.allowed_client_ids.is_empty()
                && !state
                    .config
                    .client_id
                    .allowed_client_ids
                    .iter()
                    .any(|a| a == id)
            {
                tracing::warn!(
                    trace_id = %trace_id,
                    client_id = %id,
                    "Request rejected: invalid sbz-client-id"
                );
                return error_response(
                    StatusCode::FORBIDDEN,
                    &trace_id,
                    "client_id_invalid",
                    "invalid sbz-client-id",
                );
            }

            tracing::debug!(
                trace_id = %trace_id,
                client_id = %id,
                "sbz-client-id validated"
            );
            next.run(req).await
        }
    }
}

/// Messaging-route auth: `X-Api-Key` first, JWT bearer as fallback.
///
/// API keys are looked up by their 12-character prefix, then verified
/// against the stored bcrypt hash. A successful key resolution inserts
/// synthetic [`Claims`] for the owning user so handlers stay uniform.
pub async fn messaging_auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    if let Some(key) = req
        .headers()
        .get(&API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    {
        let prefix = sambaza_storage::auth::api_key_prefix(&key);
        let candidates = match state.store.list_enabled_api_keys_by_prefix(&prefix).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "Failed to look up api key");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &trace_id,
                    "storage_error",
                    "Database error",
                );
            }
        };

        for row in candidates {
            if sambaza_storage::auth::verify_token(&key, &row.key_hash).unwrap_or(false) {
                if let Err(e) = state.store.touch_api_key_last_used(&row.id).await {
                    tracing::warn!(error = %e, "Failed to touch api key last_used_at");
                }
                let now = chrono::Utc::now().timestamp() as u64;
                req.extensions_mut().insert(Claims {
                    sub: row.user_id.clone(),
                    username: format!("apikey:{}", row.name),
                    iat: now,
                    exp: now,
                });
                return next.run(req).await;
            }
        }

        tracing::warn!(trace_id = %trace_id, "Request rejected: unknown api key");
        return error_response(
            StatusCode::UNAUTHORIZED,
            &trace_id,
            "unauthorized",
            "invalid api key",
        );
    }

    // No API key header: fall back to the JWT bearer path.
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);

    match token {
        Some(token) if !token.is_empty() => match validate_token(&state.jwt_secret, &token) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                next.run(req).await
            }
            Err(e) => {
                if matches!(e.kind(), jsonwebtoken::errors::ErrorKind::ExpiredSignature) {
                    error_response(
                        StatusCode::UNAUTHORIZED,
                        &trace_id,
                        "token_expired",
                        "token expired",
                    )
                } else {
                    error_response(
                        StatusCode::UNAUTHORIZED,
                        &trace_id,
                        "unauthorized",
                        "invalid token",
                    )
                }
            }
        },
        _ => error_response(
            StatusCode::UNAUTHORIZED,
            &trace_id,
            "unauthorized",
            "missing X-Api-Key or bearer token",
        ),
    }
}
