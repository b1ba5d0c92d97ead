//! Migration: Create alerts table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alerts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alerts::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Alerts::ServerId).big_integer().null())
                    .col(ColumnDef::new(Alerts::Severity).string().not_null())
                    .col(ColumnDef::new(Alerts::Title).string().not_null())
                    .col(ColumnDef::new(Alerts::Message).string().not_null())
                    .col(
                        ColumnDef::new(Alerts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_alerts_server_id")
                    .table(Alerts::Table)
                    .col(Alerts::ServerId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_alerts_created_at")
                    .table(Alerts::Table)
                    .col(Alerts::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alerts::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
#[iden = "alerts"]
enum Alerts {
    Table,
    Id,
    #[iden = "server_id"]
    ServerId,
    Severity,
    Title,
    Message,
    #[iden = "created_at"]
    CreatedAt,
}
