//! In-memory session state and the event stream exposed by the orchestrator.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::update_history::UpdateStatus;

/// Cooperative cancellation signal shared between the orchestrator and a
/// running pipeline task. The orchestrator only signals intent; the pipeline
/// observes the flag at every stage transition and download poll tick.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One in-memory attempt to move a server from one version to another.
/// Ephemeral: terminal sessions are retained until process restart, the
/// durable counterpart lives in `update_history`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateSession {
    pub id: String,
    pub server_id: i64,
    pub from_version: String,
    pub to_version: String,
    pub status: UpdateStatus,
    /// 0-100, non-decreasing within a run
    pub progress: u8,
    pub message: Option<String>,
    pub error: Option<String>,
    /// Set once the pre-update backup completes; rollback anchor
    pub backup_id: Option<String>,
    pub started_at: DateTime<Utc>,
    /// Whether the server process was active when the update began;
    /// determines whether the stop/start stages run
    pub was_running: bool,
    /// Routes cancellation to the download provider while a download is active
    pub download_session_id: Option<String>,
    /// Set while preserved user files exist outside their normal location
    pub temp_preserve_path: Option<PathBuf>,
    /// Durable `update_history` row backing this session
    pub history_id: i64,
}

/// A server with a newer version available, as found by auto-check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableUpdate {
    pub server_id: i64,
    pub name: String,
    pub current_version: String,
    pub available_version: String,
}

/// Update pipeline events, broadcast to all subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UpdateEvent {
    #[serde(rename = "update:started")]
    Started {
        session_id: String,
        server_id: i64,
        from_version: String,
        to_version: String,
    },
    #[serde(rename = "update:progress")]
    Progress {
        session_id: String,
        server_id: i64,
        status: UpdateStatus,
        progress: u8,
        message: String,
    },
    #[serde(rename = "update:completed")]
    Completed {
        session_id: String,
        server_id: i64,
        version: String,
    },
    #[serde(rename = "update:failed")]
    Failed {
        session_id: String,
        server_id: i64,
        error: String,
    },
    #[serde(rename = "update:cancelled")]
    Cancelled { session_id: String, server_id: i64 },
    #[serde(rename = "update:rollback-completed")]
    RollbackCompleted {
        server_id: i64,
        restored_version: String,
    },
    #[serde(rename = "updates:available")]
    UpdatesAvailable { servers: Vec<AvailableUpdate> },
}
