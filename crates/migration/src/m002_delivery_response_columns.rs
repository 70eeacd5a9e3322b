use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m002_delivery_response_columns"
    }
}

/// webhook_deliveries 增加 response_body 列，campaign_messages 增加
/// network_code 列（运营商识别码，来自送达回执）。
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                "ALTER TABLE webhook_deliveries ADD COLUMN response_body TEXT;
                 ALTER TABLE campaign_messages ADD COLUMN network_code TEXT;",
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                "ALTER TABLE webhook_deliveries DROP COLUMN response_body;
                 ALTER TABLE campaign_messages DROP COLUMN network_code;",
            )
            .await?;
        Ok(())
    }
}
