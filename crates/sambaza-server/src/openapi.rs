use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use utoipa::openapi::OpenApi;

/// `/v1/openapi.yaml` — the merged spec rendered as YAML, for tooling
/// that cannot consume the JSON route Swagger UI uses.
pub fn yaml_route(spec: Arc<OpenApi>) -> Router {
    Router::new()
        .route("/v1/openapi.yaml", get(serve_yaml))
        .with_state(spec)
}

async fn serve_yaml(State(spec): State<Arc<OpenApi>>) -> Response {
    match serde_yaml_neo::to_string(spec.as_ref()) {
        Ok(yaml) => (StatusCode::OK, [(header::CONTENT_TYPE, "text/yaml")], yaml).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "OpenAPI YAML serialization failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "spec unavailable").into_response()
        }
    }
}
