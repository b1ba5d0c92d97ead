use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// State of an in-flight download as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Downloading,
    Complete,
    Failed,
}

/// Snapshot of a download session
#[derive(Debug, Clone)]
pub struct DownloadSession {
    pub id: String,
    /// Provider-reported completion, 0-100
    pub progress: u8,
    pub status: DownloadStatus,
    pub error: Option<String>,
}

/// Fetches and installs Hytale server binaries.
#[async_trait]
pub trait DownloadProvider: Send + Sync {
    /// Latest published server version. `Ok(None)` when the provider cannot
    /// answer (offline, unauthenticated); errors are reserved for hard
    /// failures the caller should see.
    async fn latest_version(&self) -> Result<Option<String>>;

    /// Begin fetching the latest server files into `destination`, returning a
    /// session id to poll and cancel with. The provider lays the files out
    /// under the server root asynchronously.
    async fn start_download(&self, destination: &Path) -> Result<String>;

    /// Current state of a download session.
    async fn get_session(&self, session_id: &str) -> Result<DownloadSession>;

    /// Request cancellation of an in-flight download. Best-effort.
    async fn cancel(&self, session_id: &str) -> Result<()>;
}
