use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// CORS 允许的 origins 列表，为空时允许所有来源（开发模式）
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,

    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub client_id: ClientIdConfig,
    #[serde(default)]
    pub delivery_tracking: DeliveryTrackingConfig,
    #[serde(default)]
    pub retention: RetentionConfig,

    /// SMS/airtime 网关账号（未配置时发送类接口返回 gateway_not_configured）
    #[serde(default)]
    pub sms_gateway: Option<sambaza_gateway::SmsGatewayConfig>,
    /// M-Pesa 网关账号
    #[serde(default)]
    pub mpesa: Option<sambaza_gateway::MpesaConfig>,
    /// SMTP 发信账号（email 类型群发）
    #[serde(default)]
    pub smtp: Option<sambaza_gateway::SmtpConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            cors_allowed_origins: Vec::new(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            client_id: ClientIdConfig::default(),
            delivery_tracking: DeliveryTrackingConfig::default(),
            retention: RetentionConfig::default(),
            sms_gateway: None,
            mpesa: None,
            smtp: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// 完整连接 URL；缺省时由 data_dir 推导 SQLite 路径
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            url: None,
        }
    }
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("sqlite://{}/sambaza.db?mode=rwc", self.data_dir),
        }
    }

    /// 日志用：去掉 URL 中的用户信息
    pub fn redacted_url(&self) -> String {
        let url = self.connection_url();
        match url.split_once('@') {
            Some((scheme_and_creds, rest)) => match scheme_and_creds.split_once("://") {
                Some((scheme, _)) => format!("{scheme}://***@{rest}"),
                None => url,
            },
            None => url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_token_expire_secs")]
    pub token_expire_secs: u64,
    #[serde(default = "default_username")]
    pub default_username: String,
    #[serde(default = "default_password")]
    pub default_password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_expire_secs: default_token_expire_secs(),
            default_username: default_username(),
            default_password: default_password(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientIdConfig {
    /// Whether to require sbz-client-id header on public/auth routes (default: false)
    #[serde(default = "default_require_client_id")]
    pub require_client_id: bool,
    /// List of allowed sbz-client-id values
    #[serde(default)]
    pub allowed_client_ids: Vec<String>,
}

impl Default for ClientIdConfig {
    fn default() -> Self {
        Self {
            require_client_id: default_require_client_id(),
            allowed_client_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTrackingConfig {
    #[serde(default = "default_delivery_tracking_enabled")]
    pub enabled: bool,
    /// 轮询周期（秒）。回执回调与轮询两路都会覆盖计数，后写覆盖先写。
    #[serde(default = "default_delivery_tick_secs")]
    pub tick_secs: u64,
}

impl Default for DeliveryTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: default_delivery_tracking_enabled(),
            tick_secs: default_delivery_tick_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Webhook 投递日志保留天数
    #[serde(default = "default_webhook_log_retention_days")]
    pub webhook_log_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            webhook_log_days: default_webhook_log_retention_days(),
        }
    }
}

// ---- Seed file types (used by `init-services` CLI subcommand) ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesSeedFile {
    #[serde(default)]
    pub services: Vec<SeedService>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedService {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_seed_enabled")]
    pub enabled: bool,
}

fn default_http_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_token_expire_secs() -> u64 {
    86400
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "changeme".to_string()
}

fn default_require_client_id() -> bool {
    false
}

fn default_delivery_tracking_enabled() -> bool {
    true
}

fn default_delivery_tick_secs() -> u64 {
    30
}

fn default_webhook_log_retention_days() -> u32 {
    30
}

fn default_seed_enabled() -> bool {
    true
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
