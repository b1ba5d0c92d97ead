use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Descriptor of a completed backup
#[derive(Debug, Clone)]
pub struct BackupInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Snapshots and restores a server's full directory tree.
#[async_trait]
pub trait BackupService: Send + Sync {
    /// Create a full backup of the server's directory tree.
    async fn create_backup(&self, server_id: i64, label: &str) -> Result<BackupInfo>;

    /// Restore a previously created backup over the server's directory tree,
    /// returning once the restore is complete.
    async fn restore_backup(&self, backup_id: &str) -> Result<()>;
}
