use crate::config::ServerConfig;
use chrono::{DateTime, Utc};
use sambaza_gateway::mailer::SmtpMailer;
use sambaza_gateway::mpesa::MpesaClient;
use sambaza_gateway::sms::SmsClient;
use sambaza_storage::Store;
use sambaza_webhook::dispatcher::WebhookDispatcher;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub dispatcher: Arc<WebhookDispatcher>,
    /// 未配置网关账号时为 None；发送类接口返回 gateway_not_configured
    pub sms: Option<Arc<SmsClient>>,
    pub mpesa: Option<Arc<MpesaClient>>,
    pub mailer: Option<Arc<SmtpMailer>>,
    pub jwt_secret: Arc<String>,
    pub token_expire_secs: u64,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Build gateway clients from config; absent credentials leave the
    /// corresponding client unset.
    pub fn build_clients(
        config: &ServerConfig,
    ) -> (
        Option<Arc<SmsClient>>,
        Option<Arc<MpesaClient>>,
        Option<Arc<SmtpMailer>>,
    ) {
        let sms = config
            .sms_gateway
            .clone()
            .map(|cfg| Arc::new(SmsClient::new(cfg)));
        let mpesa = config
            .mpesa
            .clone()
            .map(|cfg| Arc::new(MpesaClient::new(cfg)));
        let mailer = config.smtp.as_ref().and_then(|cfg| match SmtpMailer::new(cfg) {
            Ok(m) => Some(Arc::new(m)),
            Err(e) => {
                tracing::error!(error = %e, "Invalid SMTP config, email campaigns disabled");
                None
            }
        });
        (sms, mpesa, mailer)
    }
}
