use crate::state::AppState;
use crate::{api, auth, logging, openapi};
use axum::middleware;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "sambaza API",
        description = "sambaza 消息与业务运营平台 REST API",
    ),
    tags(
        (name = "Health", description = "服务健康检查"),
        (name = "Auth", description = "认证鉴权"),
        (name = "Campaigns", description = "群发活动与送达跟踪"),
        (name = "Contacts", description = "联系人管理"),
        (name = "Messaging", description = "即时发送、余额与充值"),
        (name = "Services", description = "服务目录与开通"),
        (name = "ApiKeys", description = "API 密钥管理"),
        (name = "Webhooks", description = "Webhook 端点与投递日志"),
        (name = "Surveys", description = "问卷与回答"),
        (name = "Payments", description = "M-Pesa 支付"),
        (name = "Ussd", description = "USSD 菜单与会话"),
        (name = "Tickets", description = "服务台工单"),
        (name = "Audit", description = "审计日志"),
        (name = "Dashboard", description = "仪表盘概览"),
        (name = "Callbacks", description = "网关回调")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(utoipa::openapi::security::Http::new(
                utoipa::openapi::security::HttpAuthScheme::Bearer,
            )),
        );
        components.add_security_scheme(
            "api_key_auth",
            utoipa::openapi::security::SecurityScheme::ApiKey(
                utoipa::openapi::security::ApiKey::Header(
                    utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                ),
            ),
        );
        components.add_security_scheme(
            "client_id_auth",
            utoipa::openapi::security::SecurityScheme::ApiKey(
                utoipa::openapi::security::ApiKey::Header(
                    utoipa::openapi::security::ApiKeyValue::new("sbz-client-id"),
                ),
            ),
        );
    }
}

pub fn build_http_app(state: AppState) -> Router {
    let (public_router, public_spec) = api::public_routes().split_for_parts();
    let (login_router, login_spec) = api::auth_routes().split_for_parts();
    let (callback_router, callback_spec) = api::callback_routes().split_for_parts();
    let (protected_router, protected_spec) = api::protected_routes().split_for_parts();
    let (messaging_router, messaging_spec) = api::messaging_routes().split_for_parts();

    let mut merged_spec = ApiDoc::openapi();
    merged_spec.merge(public_spec);
    merged_spec.merge(login_spec);
    merged_spec.merge(callback_spec);
    merged_spec.merge(protected_spec);
    merged_spec.merge(messaging_spec);
    let spec = Arc::new(merged_spec.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    public_router
        .merge(login_router)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::client_id_middleware,
        ))
        .merge(callback_router)
        .merge(
            protected_router.layer(middleware::from_fn_with_state(
                state.clone(),
                auth::jwt_auth_middleware,
            )),
        )
        .merge(
            messaging_router.layer(middleware::from_fn_with_state(
                state.clone(),
                crate::middleware::messaging_auth_middleware,
            )),
        )
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/v1/openapi.json", merged_spec))
        .merge(openapi::yaml_route(spec))
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging))
}
