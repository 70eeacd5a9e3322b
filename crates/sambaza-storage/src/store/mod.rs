use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};
use std::path::Path;

use crate::auth::SecretEncryptor;

pub mod api_key;
pub mod audit;
pub mod campaign;
pub mod contact;
pub mod mpesa;
pub mod service;
pub mod survey;
pub mod ticket;
pub mod ussd;
pub mod webhook;
pub mod user;

// ---- 公开 Row 类型（从各子模块重新导出）----
pub use api_key::ApiKeyRow;
pub use audit::{AuditLogFilter, AuditLogRow};
pub use campaign::{
    CampaignFilter, CampaignMessageRow, CampaignRow, CampaignUpdate, DeliveryCounts,
};
pub use contact::{ContactFilter, ContactRow, ContactUpdate};
pub use mpesa::{MpesaCallbackUpdate, MpesaTransactionFilter, MpesaTransactionRow};
pub use service::{ServiceActivationRow, ServiceRow};
pub use survey::{SurveyResponseRow, SurveyRow, SurveyUpdate};
pub use ticket::{TicketFilter, TicketRow, TicketUpdate};
pub use ussd::{UssdMenuRow, UssdMenuUpdate, UssdSessionLogFilter, UssdSessionLogRow};
pub use webhook::{
    WebhookDeliveryFilter, WebhookDeliveryRow, WebhookEndpointRow, WebhookEndpointUpdate,
};
pub use user::UserRow;

/// 管理数据库（sambaza.db）的统一访问层。
///
/// 所有方法均为 `async fn`，底层使用 SeaORM + SQLite。
/// webhook secret、API key 副本等机密列经 [`SecretEncryptor`] 加密后落库。
pub struct Store {
    pub(crate) db: DatabaseConnection,
    pub(crate) secret_encryptor: SecretEncryptor,
}

impl Store {
    /// 连接并初始化管理数据库。
    ///
    /// - `db_url`：完整的数据库连接 URL，由调用方（服务器配置）提供。
    ///   SQLite 示例：`sqlite:///data/sambaza.db?mode=rwc`
    /// - `data_dir`：本地数据目录，用于存放机密加密密钥文件。
    ///
    /// 自动运行 `sea-orm-migration` 迁移，确保 Schema 最新。
    pub async fn new(db_url: &str, data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db = Database::connect(db_url).await?;

        // WAL 模式仅对 SQLite 有效
        if db_url.starts_with("sqlite://") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        // 运行所有待执行迁移
        Migrator::up(&db, None).await?;

        let secret_encryptor = SecretEncryptor::load_or_create(data_dir)?;
        tracing::info!(db_url = %db_url, "Initialized store (SeaORM)");

        Ok(Self {
            db,
            secret_encryptor,
        })
    }

    /// 返回底层数据库连接引用（供子模块使用）。
    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// 返回机密加密器引用。
    pub fn secret_encryptor(&self) -> &SecretEncryptor {
        &self.secret_encryptor
    }
}
