//! Migration: Create update_history table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UpdateHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UpdateHistory::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UpdateHistory::ServerId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(UpdateHistory::FromVersion).string().not_null())
                    .col(ColumnDef::new(UpdateHistory::ToVersion).string().not_null())
                    .col(ColumnDef::new(UpdateHistory::Status).string().not_null())
                    .col(ColumnDef::new(UpdateHistory::Error).string().null())
                    .col(ColumnDef::new(UpdateHistory::BackupId).string().null())
                    .col(
                        ColumnDef::new(UpdateHistory::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UpdateHistory::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_update_history_server_id")
                    .table(UpdateHistory::Table)
                    .col(UpdateHistory::ServerId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_update_history_backup_id")
                    .table(UpdateHistory::Table)
                    .col(UpdateHistory::BackupId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_update_history_started_at")
                    .table(UpdateHistory::Table)
                    .col(UpdateHistory::StartedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(UpdateHistory::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
#[iden = "update_history"]
enum UpdateHistory {
    Table,
    Id,
    #[iden = "server_id"]
    ServerId,
    #[iden = "from_version"]
    FromVersion,
    #[iden = "to_version"]
    ToVersion,
    Status,
    Error,
    #[iden = "backup_id"]
    BackupId,
    #[iden = "started_at"]
    StartedAt,
    #[iden = "completed_at"]
    CompletedAt,
}
