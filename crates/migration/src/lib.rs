//! 管理库迁移。Schema 以 raw SQL 表达，随服务启动自动执行。

pub use sea_orm_migration::prelude::*;

mod m001_initial_schema;
mod m002_delivery_response_columns;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m001_initial_schema::Migration),
            Box::new(m002_delivery_response_columns::Migration),
        ]
    }
}
