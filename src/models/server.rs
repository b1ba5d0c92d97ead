use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "servers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    /// Root directory of the server installation on disk
    pub path: String,
    pub version: String,
    pub available_version: Option<String>,
    pub last_version_check: Option<DateTimeUtc>,
    /// Mutual-exclusion flag: set while an update pipeline owns this server
    pub update_in_progress: bool,
    /// Backup taken by the last update attempt; anchor for rollback
    pub pre_update_backup_id: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
