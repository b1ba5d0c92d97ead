use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "update_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub server_id: i64,
    pub from_version: String,
    pub to_version: String,
    pub status: String,
    pub error: Option<String>,
    pub backup_id: Option<String>,
    pub started_at: DateTimeUtc,
    pub completed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Stages of the update pipeline, in happy-path order. `Failed` is reachable
/// from every non-terminal stage; `RolledBack` only through the separate
/// rollback operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Pending,
    Stopping,
    BackingUp,
    Preserving,
    Downloading,
    Installing,
    Restoring,
    Starting,
    Completed,
    Failed,
    RolledBack,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Pending => "pending",
            UpdateStatus::Stopping => "stopping",
            UpdateStatus::BackingUp => "backing_up",
            UpdateStatus::Preserving => "preserving",
            UpdateStatus::Downloading => "downloading",
            UpdateStatus::Installing => "installing",
            UpdateStatus::Restoring => "restoring",
            UpdateStatus::Starting => "starting",
            UpdateStatus::Completed => "completed",
            UpdateStatus::Failed => "failed",
            UpdateStatus::RolledBack => "rolled_back",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(UpdateStatus::Pending),
            "stopping" => Some(UpdateStatus::Stopping),
            "backing_up" => Some(UpdateStatus::BackingUp),
            "preserving" => Some(UpdateStatus::Preserving),
            "downloading" => Some(UpdateStatus::Downloading),
            "installing" => Some(UpdateStatus::Installing),
            "restoring" => Some(UpdateStatus::Restoring),
            "starting" => Some(UpdateStatus::Starting),
            "completed" => Some(UpdateStatus::Completed),
            "failed" => Some(UpdateStatus::Failed),
            "rolled_back" => Some(UpdateStatus::RolledBack),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpdateStatus::Completed | UpdateStatus::Failed | UpdateStatus::RolledBack
        )
    }
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
