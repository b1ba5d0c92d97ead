//! Migration: Create servers table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Servers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Servers::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Servers::Name).string().not_null())
                    .col(ColumnDef::new(Servers::Path).string().not_null())
                    .col(ColumnDef::new(Servers::Version).string().not_null())
                    .col(ColumnDef::new(Servers::AvailableVersion).string().null())
                    .col(
                        ColumnDef::new(Servers::LastVersionCheck)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Servers::UpdateInProgress)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Servers::PreUpdateBackupId).string().null())
                    .col(
                        ColumnDef::new(Servers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Servers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_servers_name")
                    .table(Servers::Table)
                    .col(Servers::Name)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Servers::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
#[iden = "servers"]
enum Servers {
    Table,
    Id,
    Name,
    Path,
    Version,
    #[iden = "available_version"]
    AvailableVersion,
    #[iden = "last_version_check"]
    LastVersionCheck,
    #[iden = "update_in_progress"]
    UpdateInProgress,
    #[iden = "pre_update_backup_id"]
    PreUpdateBackupId,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}
