//! Server version update pipeline.
//!
//! One `ServerUpdateService` owns every update session and drives the stage
//! machine: stop -> backup -> preserve -> download -> install -> restore ->
//! start. Callers get the session descriptor back immediately and observe
//! progress through the broadcast event stream; failures land on the durable
//! history record as well as the in-memory session.

mod auto_check;
mod preserve;
mod session;

pub use auto_check::AutoCheckHandle;
pub use preserve::{PreservedPaths, DATA_DIRS, INSTALL_DIR, MARKER_JAR};
pub use session::{AvailableUpdate, CancelFlag, UpdateEvent, UpdateSession};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, sleep, Duration, Instant};
use uuid::Uuid;

use crate::config::CONFIG;
use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::models::prelude::*;
use crate::models::update_history::UpdateStatus;
use crate::models::{server, update_history};
use crate::services::download::DownloadStatus;
use crate::services::fsops;
use crate::services::notification::NotifyKind;
use crate::services::{BackupService, DownloadProvider, NotificationSink, ProcessController};
use crate::state::UpdateBroadcast;

/// Fixed progress checkpoint entered with each stage. The downloading stage
/// interpolates up to the installing checkpoint against the provider's own
/// percentage.
fn checkpoint(status: UpdateStatus) -> u8 {
    match status {
        UpdateStatus::Pending => 0,
        UpdateStatus::Stopping => 5,
        UpdateStatus::BackingUp => 15,
        UpdateStatus::Preserving => 30,
        UpdateStatus::Downloading => 45,
        UpdateStatus::Installing => 70,
        UpdateStatus::Restoring => 80,
        UpdateStatus::Starting => 90,
        UpdateStatus::Completed => 100,
        UpdateStatus::Failed | UpdateStatus::RolledBack => 0,
    }
}

const DOWNLOAD_WINDOW_START: u8 = 45;
const DOWNLOAD_WINDOW_END: u8 = 70;

/// Outcome of a version check for one server
#[derive(Debug, Clone, Serialize)]
pub struct VersionCheckResult {
    pub server_id: i64,
    pub server_name: String,
    pub current_version: String,
    pub available_version: Option<String>,
    pub update_available: bool,
    pub checked_at: DateTime<Utc>,
}

/// Orchestrates server version updates: sessions, the pipeline state machine,
/// cancellation, rollback, and version checks.
#[derive(Clone)]
pub struct ServerUpdateService {
    db: DbConn,
    process: Arc<dyn ProcessController>,
    backups: Arc<dyn BackupService>,
    downloads: Arc<dyn DownloadProvider>,
    notifier: Arc<dyn NotificationSink>,
    sessions: Arc<RwLock<HashMap<String, UpdateSession>>>,
    cancel_flags: Arc<RwLock<HashMap<String, CancelFlag>>>,
    events_tx: UpdateBroadcast,
}

impl ServerUpdateService {
    pub fn new(
        db: DbConn,
        process: Arc<dyn ProcessController>,
        backups: Arc<dyn BackupService>,
        downloads: Arc<dyn DownloadProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            db,
            process,
            backups,
            downloads,
            notifier,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            cancel_flags: Arc::new(RwLock::new(HashMap::new())),
            events_tx,
        }
    }

    /// Subscribe to the update event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: UpdateEvent) {
        // Nobody listening is fine
        let _ = self.events_tx.send(event);
    }

    /// Look up a session by id.
    pub async fn get_session(&self, session_id: &str) -> Option<UpdateSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Update history for a server, most recent first. `limit` defaults to
    /// the configured bound.
    pub async fn get_update_history(
        &self,
        server_id: i64,
        limit: Option<u64>,
    ) -> Result<Vec<update_history::Model>> {
        let limit = limit.unwrap_or(CONFIG.updates.history_limit);
        Ok(UpdateHistory::find()
            .filter(update_history::Column::ServerId.eq(server_id))
            .order_by_desc(update_history::Column::StartedAt)
            .limit(limit)
            .all(&self.db)
            .await?)
    }

    async fn load_server(&self, server_id: i64) -> Result<server::Model> {
        Server::find_by_id(server_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Server {} not found", server_id)))
    }

    // ------------------------------------------------------------------
    // Version checks
    // ------------------------------------------------------------------

    /// Latest version from the download provider, degraded to `None` on any
    /// lookup failure. Version checks never fail because the provider is
    /// unreachable.
    async fn lookup_latest_version(&self) -> Option<String> {
        match self.downloads.latest_version().await {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!(error = %e, "Version lookup failed, treating as no version info");
                None
            }
        }
    }

    async fn apply_version_check(
        &self,
        srv: server::Model,
        latest: Option<String>,
    ) -> Result<VersionCheckResult> {
        let now = Utc::now();
        let available = latest.filter(|v| *v != srv.version);

        server::ActiveModel {
            id: Set(srv.id),
            available_version: Set(available.clone()),
            last_version_check: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        }
        .update(&self.db)
        .await?;

        Ok(VersionCheckResult {
            server_id: srv.id,
            server_name: srv.name,
            current_version: srv.version,
            update_available: available.is_some(),
            available_version: available,
            checked_at: now,
        })
    }

    /// Check one server for a newer version and persist the result.
    pub async fn check_for_update(&self, server_id: i64) -> Result<VersionCheckResult> {
        let srv = self.load_server(server_id).await?;
        let latest = self.lookup_latest_version().await;
        self.apply_version_check(srv, latest).await
    }

    /// Check every server, with a single provider round trip shared across
    /// all of them.
    pub async fn check_all_for_updates(&self) -> Result<Vec<VersionCheckResult>> {
        let servers = Server::find().all(&self.db).await?;
        let latest = self.lookup_latest_version().await;

        let mut results = Vec::with_capacity(servers.len());
        for srv in servers {
            results.push(self.apply_version_check(srv, latest.clone()).await?);
        }
        Ok(results)
    }

    // ------------------------------------------------------------------
    // Start update
    // ------------------------------------------------------------------

    /// Begin an update for a server. Validates preconditions synchronously,
    /// then launches the pipeline as a detached task and returns the session
    /// descriptor; progress is observed via [`subscribe`](Self::subscribe).
    pub async fn start_update(
        &self,
        server_id: i64,
        target_version: Option<String>,
    ) -> Result<UpdateSession> {
        let srv = self.load_server(server_id).await?;

        if srv.update_in_progress {
            return Err(AppError::Conflict(format!(
                "An update is already in progress for server '{}'",
                srv.name
            )));
        }

        let target = match target_version {
            Some(v) => v,
            None => match self.downloads.latest_version().await {
                Ok(Some(v)) => v,
                Ok(None) => {
                    return Err(AppError::BadRequest(
                        "Unable to resolve the latest server version; is the download provider authenticated?"
                            .to_string(),
                    ))
                }
                Err(e) => {
                    return Err(AppError::BadRequest(format!(
                        "Unable to resolve the latest server version: {}",
                        e
                    )))
                }
            },
        };

        if target == srv.version {
            return Err(AppError::BadRequest(format!(
                "Server '{}' is already on version {}",
                srv.name, target
            )));
        }

        let was_running = self.process.is_running(server_id).await;
        let now = Utc::now();

        let history = update_history::ActiveModel {
            server_id: Set(server_id),
            from_version: Set(srv.version.clone()),
            to_version: Set(target.clone()),
            status: Set(UpdateStatus::Pending.to_string()),
            started_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        // Flag goes up before any destructive work and comes down only
        // through the commit or failure paths
        let srv = {
            let mut active: server::ActiveModel = srv.into();
            active.update_in_progress = Set(true);
            active.updated_at = Set(now);
            active.update(&self.db).await?
        };

        let session = UpdateSession {
            id: Uuid::new_v4().to_string(),
            server_id,
            from_version: srv.version.clone(),
            to_version: target.clone(),
            status: UpdateStatus::Pending,
            progress: 0,
            message: Some("Update queued".to_string()),
            error: None,
            backup_id: None,
            started_at: now,
            was_running,
            download_session_id: None,
            temp_preserve_path: None,
            history_id: history.id,
        };

        let cancel = CancelFlag::default();
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        self.cancel_flags
            .write()
            .await
            .insert(session.id.clone(), cancel.clone());

        tracing::info!(
            server = %srv.name,
            from = %session.from_version,
            to = %target,
            session = %session.id,
            "Starting server update"
        );
        self.emit(UpdateEvent::Started {
            session_id: session.id.clone(),
            server_id,
            from_version: session.from_version.clone(),
            to_version: target.clone(),
        });
        self.notifier
            .notify(
                NotifyKind::UpdateStarted,
                &srv.name,
                &format!("Updating from {} to {}", session.from_version, target),
            )
            .await;

        let svc = self.clone();
        let session_id = session.id.clone();
        tokio::spawn(async move {
            svc.run_pipeline(session_id, srv, cancel).await;
        });

        Ok(session)
    }

    // ------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------

    async fn run_pipeline(&self, session_id: String, srv: server::Model, cancel: CancelFlag) {
        if let Err(e) = self.run_stages(&session_id, &srv, &cancel).await {
            tracing::error!(session = %session_id, server = %srv.name, error = %e, "Update failed");
            self.finish_failed(&session_id, &e.to_string(), false).await;
        }
    }

    async fn run_stages(
        &self,
        session_id: &str,
        srv: &server::Model,
        cancel: &CancelFlag,
    ) -> Result<()> {
        let root = PathBuf::from(&srv.path);
        let (was_running, from_version, to_version, history_id) = {
            let sessions = self.sessions.read().await;
            let s = sessions
                .get(session_id)
                .ok_or_else(|| AppError::Internal("Update session disappeared".to_string()))?;
            (
                s.was_running,
                s.from_version.clone(),
                s.to_version.clone(),
                s.history_id,
            )
        };

        // 1. Stop the process, then give it a moment to release file handles
        if was_running {
            self.transition(session_id, UpdateStatus::Stopping, "Stopping server", cancel)
                .await?;
            self.process.stop(srv.id).await?;
            sleep(Duration::from_secs(CONFIG.updates.settle_delay_secs)).await;
        }

        // 2. Full snapshot; the rollback anchor
        self.transition(
            session_id,
            UpdateStatus::BackingUp,
            "Creating pre-update backup",
            cancel,
        )
        .await?;
        let label = format!("pre-update {} -> {}", from_version, to_version);
        let backup = self.backups.create_backup(srv.id, &label).await?;
        {
            let mut sessions = self.sessions.write().await;
            if let Some(s) = sessions.get_mut(session_id) {
                s.backup_id = Some(backup.id.clone());
            }
        }
        server::ActiveModel {
            id: Set(srv.id),
            pre_update_backup_id: Set(Some(backup.id.clone())),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .update(&self.db)
        .await?;
        update_history::ActiveModel {
            id: Set(history_id),
            backup_id: Set(Some(backup.id.clone())),
            ..Default::default()
        }
        .update(&self.db)
        .await?;

        // 3. Copy user data out of harm's way
        self.transition(
            session_id,
            UpdateStatus::Preserving,
            "Preserving user data",
            cancel,
        )
        .await?;
        let preserved = PreservedPaths::scan(&root).await?;
        if preserved.is_empty() {
            tracing::debug!(server = %srv.name, "Nothing to preserve");
        }
        let temp_dir = std::env::temp_dir().join(format!("hypanel-preserve-{}", session_id));
        fsops::remove_path_with_retry(&temp_dir).await?;
        tokio::fs::create_dir_all(&temp_dir).await?;
        {
            let mut sessions = self.sessions.write().await;
            if let Some(s) = sessions.get_mut(session_id) {
                s.temp_preserve_path = Some(temp_dir.clone());
            }
        }
        preserved.preserve_to(&root, &temp_dir).await?;

        // 4. Wipe the versioned binaries, then let the provider lay down the
        //    new version; wait for it with a hard ceiling
        self.transition(
            session_id,
            UpdateStatus::Downloading,
            "Downloading server files",
            cancel,
        )
        .await?;
        let install_dir = root.join(INSTALL_DIR);
        if install_dir.is_dir() {
            let mut entries = tokio::fs::read_dir(&install_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                fsops::remove_path_with_retry(&entry.path()).await?;
            }
        }
        let download_id = self.downloads.start_download(&root).await?;
        {
            let mut sessions = self.sessions.write().await;
            if let Some(s) = sessions.get_mut(session_id) {
                s.download_session_id = Some(download_id.clone());
            }
        }
        self.wait_for_download(session_id, srv.id, &download_id, cancel)
            .await?;

        // 5. A finished download is not necessarily a usable install
        self.transition(
            session_id,
            UpdateStatus::Installing,
            "Verifying installation",
            cancel,
        )
        .await?;
        let marker = install_dir.join(MARKER_JAR);
        if !marker.is_file() {
            return Err(AppError::Internal(format!(
                "Download finished but {} is missing from the new install",
                marker.display()
            )));
        }

        // 6. Copy user data back over whatever the download shipped.
        //    Wipe -> download -> restore ordering guarantees user data wins
        //    over new-version defaults.
        self.transition(
            session_id,
            UpdateStatus::Restoring,
            "Restoring preserved user data",
            cancel,
        )
        .await?;
        preserved.restore_from(&temp_dir, &root).await?;
        fsops::remove_path_with_retry(&temp_dir).await?;
        {
            let mut sessions = self.sessions.write().await;
            if let Some(s) = sessions.get_mut(session_id) {
                s.temp_preserve_path = None;
            }
        }

        // 7. Commit the new version
        server::ActiveModel {
            id: Set(srv.id),
            version: Set(to_version.clone()),
            available_version: Set(None),
            update_in_progress: Set(false),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .update(&self.db)
        .await?;

        // 8. Bring the server back if we took it down
        if was_running {
            self.transition(session_id, UpdateStatus::Starting, "Starting server", cancel)
                .await?;
            self.process.start(srv.id).await?;
        }

        // 9. Done
        self.finish_completed(session_id, srv, &from_version, &to_version, history_id)
            .await
    }

    /// Poll the provider until the download completes, fails, or the ceiling
    /// elapses. The provider's 0-100 is mapped linearly onto the update's
    /// 45-70 window; the cancel flag is observed every tick.
    async fn wait_for_download(
        &self,
        session_id: &str,
        server_id: i64,
        download_id: &str,
        cancel: &CancelFlag,
    ) -> Result<()> {
        let timeout = Duration::from_secs(CONFIG.updates.download_timeout_secs);
        let deadline = Instant::now() + timeout;
        let mut ticker = interval(Duration::from_secs(
            CONFIG.updates.download_poll_interval_secs.max(1),
        ));

        loop {
            ticker.tick().await;

            if cancel.is_cancelled() {
                return Err(AppError::Internal(
                    "Update cancelled while downloading".to_string(),
                ));
            }
            if Instant::now() >= deadline {
                return Err(AppError::Internal(format!(
                    "Download did not finish within {} seconds",
                    timeout.as_secs()
                )));
            }

            let dl = self.downloads.get_session(download_id).await?;
            match dl.status {
                DownloadStatus::Complete => return Ok(()),
                DownloadStatus::Failed => {
                    return Err(AppError::Internal(format!(
                        "Download failed: {}",
                        dl.error.unwrap_or_else(|| "unknown error".to_string())
                    )))
                }
                DownloadStatus::Downloading => {
                    let span = (DOWNLOAD_WINDOW_END - DOWNLOAD_WINDOW_START) as u32;
                    let mapped = DOWNLOAD_WINDOW_START
                        + (dl.progress.min(100) as u32 * span / 100) as u8;
                    self.set_progress(
                        session_id,
                        server_id,
                        mapped,
                        format!("Downloading server files ({}%)", dl.progress.min(100)),
                    )
                    .await;
                }
            }
        }
    }

    /// Enter a stage: bail if cancellation was requested, bump the session to
    /// the stage checkpoint, mirror the status onto the durable history
    /// record, and emit a progress event.
    async fn transition(
        &self,
        session_id: &str,
        status: UpdateStatus,
        message: &str,
        cancel: &CancelFlag,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(AppError::Internal("Update cancelled".to_string()));
        }

        let (server_id, progress, history_id) = {
            let mut sessions = self.sessions.write().await;
            let s = sessions
                .get_mut(session_id)
                .ok_or_else(|| AppError::Internal("Update session disappeared".to_string()))?;
            s.status = status;
            s.progress = s.progress.max(checkpoint(status));
            s.message = Some(message.to_string());
            (s.server_id, s.progress, s.history_id)
        };

        update_history::ActiveModel {
            id: Set(history_id),
            status: Set(status.to_string()),
            ..Default::default()
        }
        .update(&self.db)
        .await?;

        tracing::info!(session = session_id, status = %status, progress, "Update stage");
        self.emit(UpdateEvent::Progress {
            session_id: session_id.to_string(),
            server_id,
            status,
            progress,
            message: message.to_string(),
        });
        Ok(())
    }

    /// Progress-only refresh within the current stage (download window).
    async fn set_progress(&self, session_id: &str, server_id: i64, progress: u8, message: String) {
        let (status, progress) = {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(session_id) {
                Some(s) => {
                    s.progress = s.progress.max(progress);
                    s.message = Some(message.clone());
                    (s.status, s.progress)
                }
                None => return,
            }
        };

        self.emit(UpdateEvent::Progress {
            session_id: session_id.to_string(),
            server_id,
            status,
            progress,
            message,
        });
    }

    async fn finish_completed(
        &self,
        session_id: &str,
        srv: &server::Model,
        from_version: &str,
        to_version: &str,
        history_id: i64,
    ) -> Result<()> {
        {
            let mut sessions = self.sessions.write().await;
            if let Some(s) = sessions.get_mut(session_id) {
                s.status = UpdateStatus::Completed;
                s.progress = 100;
                s.message = Some(format!("Updated to version {}", to_version));
            }
        }

        update_history::ActiveModel {
            id: Set(history_id),
            status: Set(UpdateStatus::Completed.to_string()),
            completed_at: Set(Some(Utc::now())),
            ..Default::default()
        }
        .update(&self.db)
        .await?;

        tracing::info!(server = %srv.name, version = to_version, "Server update completed");
        self.emit(UpdateEvent::Progress {
            session_id: session_id.to_string(),
            server_id: srv.id,
            status: UpdateStatus::Completed,
            progress: 100,
            message: "Update completed".to_string(),
        });
        self.emit(UpdateEvent::Completed {
            session_id: session_id.to_string(),
            server_id: srv.id,
            version: to_version.to_string(),
        });
        self.notifier
            .notify(
                NotifyKind::UpdateCompleted,
                &srv.name,
                &format!("Updated from {} to {}", from_version, to_version),
            )
            .await;
        Ok(())
    }

    /// The single terminal-failure path: used by the pipeline's error
    /// handler and by cancellation. Idempotent: a cancelled pipeline unwinds
    /// into here a second time and only re-runs the temp cleanup. Cleanup
    /// failures are logged, not propagated.
    async fn finish_failed(&self, session_id: &str, error: &str, cancelled: bool) {
        let state = {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(session_id) {
                Some(s) => {
                    let temp = s.temp_preserve_path.take();
                    if s.status.is_terminal() {
                        (s.server_id, s.history_id, temp, false)
                    } else {
                        s.status = UpdateStatus::Failed;
                        s.error = Some(error.to_string());
                        s.message = Some(if cancelled {
                            "Update cancelled".to_string()
                        } else {
                            "Update failed".to_string()
                        });
                        (s.server_id, s.history_id, temp, true)
                    }
                }
                None => return,
            }
        };
        let (server_id, history_id, temp, newly_terminal) = state;

        if let Some(path) = temp {
            if let Err(e) = fsops::remove_path_with_retry(&path).await {
                tracing::warn!(error = %e, path = %path.display(), "Failed to remove temp preserve directory");
            }
        }

        if !newly_terminal {
            return;
        }

        if let Err(e) = (server::ActiveModel {
            id: Set(server_id),
            update_in_progress: Set(false),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .update(&self.db)
        .await
        {
            tracing::error!(error = %e, server_id, "Failed to clear update-in-progress flag");
        }

        if let Err(e) = (update_history::ActiveModel {
            id: Set(history_id),
            status: Set(UpdateStatus::Failed.to_string()),
            error: Set(Some(error.to_string())),
            completed_at: Set(Some(Utc::now())),
            ..Default::default()
        })
        .update(&self.db)
        .await
        {
            tracing::error!(error = %e, history_id, "Failed to record update failure");
        }

        if cancelled {
            self.emit(UpdateEvent::Cancelled {
                session_id: session_id.to_string(),
                server_id,
            });
        } else {
            self.emit(UpdateEvent::Failed {
                session_id: session_id.to_string(),
                server_id,
                error: error.to_string(),
            });

            let name = Server::find_by_id(server_id)
                .one(&self.db)
                .await
                .ok()
                .flatten()
                .map(|s| s.name)
                .unwrap_or_else(|| format!("server {}", server_id));
            self.notifier
                .notify(NotifyKind::UpdateFailed, &name, error)
                .await;
        }
    }

    // ------------------------------------------------------------------
    // Cancel
    // ------------------------------------------------------------------

    /// Cancel a running update. Legal only while the session is non-terminal
    /// and not yet past the download stage; from installing onwards the
    /// update runs to its end and rollback is the remediation. Partially
    /// applied filesystem changes from completed stages are not undone here.
    pub async fn cancel_update(&self, session_id: &str) -> Result<()> {
        let (status, download_id) = {
            let sessions = self.sessions.read().await;
            let s = sessions.get(session_id).ok_or_else(|| {
                AppError::NotFound(format!("Update session {} not found", session_id))
            })?;
            (s.status, s.download_session_id.clone())
        };

        if status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Update session has already finished ({})",
                status
            )));
        }
        if matches!(
            status,
            UpdateStatus::Installing | UpdateStatus::Restoring | UpdateStatus::Starting
        ) {
            return Err(AppError::Conflict(
                "Update is past the download stage and can no longer be cancelled; use rollback instead"
                    .to_string(),
            ));
        }

        if let Some(flag) = self.cancel_flags.read().await.get(session_id) {
            flag.cancel();
        }

        // Best-effort, not awaited to completion
        if let Some(id) = download_id {
            let downloads = self.downloads.clone();
            tokio::spawn(async move {
                if let Err(e) = downloads.cancel(&id).await {
                    tracing::warn!(error = %e, download = %id, "Failed to cancel download session");
                }
            });
        }

        tracing::info!(session = session_id, "Update cancelled by user");
        self.finish_failed(session_id, "Update cancelled by user", true)
            .await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rollback
    // ------------------------------------------------------------------

    /// Revert a server to its pre-update backup. Independent of any
    /// in-memory session; works from the durable history record, so it can
    /// run long after the original update attempt (or a process restart).
    /// Returns the restored version.
    pub async fn rollback(&self, server_id: i64) -> Result<String> {
        let srv = self.load_server(server_id).await?;

        if srv.update_in_progress {
            return Err(AppError::Conflict(format!(
                "Server '{}' has an update in progress; cancel it before rolling back",
                srv.name
            )));
        }

        let backup_id = srv.pre_update_backup_id.clone().ok_or_else(|| {
            AppError::BadRequest(format!(
                "Server '{}' has no pre-update backup to roll back to",
                srv.name
            ))
        })?;

        // The most recent attempt anchored to this backup knows the original version
        let history = UpdateHistory::find()
            .filter(update_history::Column::ServerId.eq(server_id))
            .filter(update_history::Column::BackupId.eq(backup_id.clone()))
            .order_by_desc(update_history::Column::StartedAt)
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No update history found for backup {}", backup_id))
            })?;

        let was_running = self.process.is_running(server_id).await;
        if was_running {
            self.process.stop(server_id).await?;
            sleep(Duration::from_secs(CONFIG.updates.settle_delay_secs)).await;
        }

        tracing::info!(server = %srv.name, backup = %backup_id, "Rolling back server");
        self.backups.restore_backup(&backup_id).await?;

        let restored_version = history.from_version.clone();
        let now = Utc::now();
        server::ActiveModel {
            id: Set(server_id),
            version: Set(restored_version.clone()),
            pre_update_backup_id: Set(None),
            updated_at: Set(now),
            ..Default::default()
        }
        .update(&self.db)
        .await?;

        update_history::ActiveModel {
            id: Set(history.id),
            status: Set(UpdateStatus::RolledBack.to_string()),
            completed_at: Set(Some(now)),
            ..Default::default()
        }
        .update(&self.db)
        .await?;

        if was_running {
            self.process.start(server_id).await?;
        }

        tracing::info!(server = %srv.name, version = %restored_version, "Rollback completed");
        self.emit(UpdateEvent::RollbackCompleted {
            server_id,
            restored_version: restored_version.clone(),
        });
        self.notifier
            .notify(
                NotifyKind::UpdateRolledBack,
                &srv.name,
                &format!("Restored version {}", restored_version),
            )
            .await;

        Ok(restored_version)
    }
}
