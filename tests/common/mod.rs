//! Test helpers and utilities for unit and integration testing.
//!
//! Provides an in-memory database factory, an on-disk server tree fixture,
//! and mock implementations of the process, backup, download, and
//! notification seams consumed by the update pipeline.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use tempfile::TempDir;
use tokio::sync::Mutex;

use hypanel::error::{AppError, Result};
use hypanel::migrations::Migrator;
use hypanel::models::server;
use hypanel::services::fsops;
use hypanel::services::update::{ServerUpdateService, UpdateSession, MARKER_JAR};
use hypanel::services::{
    BackupInfo, BackupService, DownloadProvider, DownloadSession, DownloadStatus,
    NotificationSink, NotifyKind, ProcessController,
};

/// Version every fixture server starts on
pub const OLD_VERSION: &str = "1.0.0";
/// Version the mock provider publishes
pub const NEW_VERSION: &str = "1.1.0";
/// Config content written by the fixture; must survive an update verbatim
pub const CUSTOM_CONFIG: &str = "{\"motd\":\"welcome to my server\"}";

/// Create an in-memory SQLite database for testing
pub async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run test migrations");

    db
}

/// Insert a server row pointing at `root`
pub async fn create_test_server(
    db: &DatabaseConnection,
    name: &str,
    root: &Path,
    version: &str,
) -> server::Model {
    let now = chrono::Utc::now();
    server::ActiveModel {
        name: Set(name.to_string()),
        path: Set(root.to_string_lossy().to_string()),
        version: Set(version.to_string()),
        available_version: Set(None),
        last_version_check: Set(None),
        update_in_progress: Set(false),
        pre_update_backup_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert test server")
}

/// Lay down a realistic server tree: versioned install subtree plus the
/// user-data directories that must survive an update.
pub async fn build_server_tree(root: &Path, version: &str) {
    let install = root.join("server");
    tokio::fs::create_dir_all(install.join("config")).await.unwrap();
    tokio::fs::write(install.join(MARKER_JAR), format!("jar-{}", version))
        .await
        .unwrap();
    tokio::fs::write(install.join("config").join("server.json"), CUSTOM_CONFIG)
        .await
        .unwrap();
    tokio::fs::write(install.join("server.properties"), "max-players=20")
        .await
        .unwrap();

    tokio::fs::create_dir_all(root.join("mods")).await.unwrap();
    tokio::fs::write(root.join("mods").join("example-mod.jar"), "mod bytes")
        .await
        .unwrap();
    tokio::fs::create_dir_all(root.join("universe")).await.unwrap();
    tokio::fs::write(root.join("universe").join("world.dat"), "world bytes")
        .await
        .unwrap();
    tokio::fs::create_dir_all(root.join("logs")).await.unwrap();
    tokio::fs::write(root.join("logs").join("latest.log"), "log lines")
        .await
        .unwrap();
}

/// Write what a provider download deposits: a fresh install subtree with
/// default config. `with_marker` false simulates a truncated download.
pub async fn write_provider_install(root: &Path, version: &str, with_marker: bool) {
    let install = root.join("server");
    tokio::fs::create_dir_all(install.join("config")).await.unwrap();
    if with_marker {
        tokio::fs::write(install.join(MARKER_JAR), format!("jar-{}", version))
            .await
            .unwrap();
    }
    tokio::fs::write(
        install.join("config").join("server.json"),
        "{\"motd\":\"A Hytale Server\"}",
    )
    .await
    .unwrap();
}

// ============================================================================
// Mocks
// ============================================================================

/// Single-server process controller with call counters
#[derive(Default)]
pub struct MockProcess {
    pub running: AtomicBool,
    pub stops: AtomicU32,
    pub starts: AtomicU32,
    pub fail_stop: AtomicBool,
}

impl MockProcess {
    pub fn new(running: bool) -> Self {
        Self {
            running: AtomicBool::new(running),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ProcessController for MockProcess {
    async fn is_running(&self, _server_id: i64) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn stop(&self, _server_id: i64) -> Result<()> {
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(AppError::Internal("Process refused to stop".to_string()));
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self, _server_id: i64) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Backup service that snapshots the server tree into a scratch directory
/// and restores it with a wipe-and-copy, like the real thing.
pub struct MockBackups {
    root: PathBuf,
    store: TempDir,
    pub labels: StdMutex<Vec<String>>,
    pub fail_create: AtomicBool,
}

impl MockBackups {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            store: TempDir::new().expect("Failed to create backup store"),
            labels: StdMutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl BackupService for MockBackups {
    async fn create_backup(&self, _server_id: i64, label: &str) -> Result<BackupInfo> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AppError::Internal("Backup storage full".to_string()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        fsops::copy_dir_all(&self.root, &self.store.path().join(&id)).await?;
        self.labels.lock().unwrap().push(label.to_string());
        Ok(BackupInfo {
            id,
            created_at: chrono::Utc::now(),
        })
    }

    async fn restore_backup(&self, backup_id: &str) -> Result<()> {
        let snapshot = self.store.path().join(backup_id);
        if !snapshot.is_dir() {
            return Err(AppError::NotFound(format!("Backup {} not found", backup_id)));
        }

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            fsops::remove_path_with_retry(&entry.path()).await?;
        }
        fsops::copy_dir_all(&snapshot, &self.root).await?;
        Ok(())
    }
}

/// How a mocked download session behaves once started
#[derive(Debug, Clone)]
pub enum DownloadPlan {
    /// Files land immediately; first poll sees a completed download
    Succeed,
    /// Reports progress for `polls` polls before the files land
    SucceedAfterPolls { polls: u32 },
    /// First poll reports a failed download
    Fail { error: String },
    /// Never completes; stays in progress until cancelled
    Hang,
    /// Completes but the install is missing the marker jar
    MissingMarker,
}

struct MockDownloadState {
    dest: PathBuf,
    progress: u8,
    status: DownloadStatus,
    error: Option<String>,
    polls_remaining: u32,
}

/// Download provider driven by a [`DownloadPlan`]
pub struct MockDownloads {
    pub latest: StdMutex<Option<String>>,
    pub latest_fails: AtomicBool,
    plan: StdMutex<DownloadPlan>,
    sessions: Mutex<std::collections::HashMap<String, MockDownloadState>>,
    pub cancelled: StdMutex<Vec<String>>,
}

impl MockDownloads {
    pub fn new(plan: DownloadPlan) -> Self {
        Self {
            latest: StdMutex::new(Some(NEW_VERSION.to_string())),
            latest_fails: AtomicBool::new(false),
            plan: StdMutex::new(plan),
            sessions: Mutex::new(std::collections::HashMap::new()),
            cancelled: StdMutex::new(Vec::new()),
        }
    }

    pub fn set_latest(&self, version: Option<&str>) {
        *self.latest.lock().unwrap() = version.map(|v| v.to_string());
    }

    fn plan(&self) -> DownloadPlan {
        self.plan.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadProvider for MockDownloads {
    async fn latest_version(&self) -> Result<Option<String>> {
        if self.latest_fails.load(Ordering::SeqCst) {
            return Err(AppError::ServiceUnavailable(
                "Version service unreachable".to_string(),
            ));
        }
        Ok(self.latest.lock().unwrap().clone())
    }

    async fn start_download(&self, destination: &Path) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut state = MockDownloadState {
            dest: destination.to_path_buf(),
            progress: 0,
            status: DownloadStatus::Downloading,
            error: None,
            polls_remaining: 0,
        };

        match self.plan() {
            DownloadPlan::Succeed => {
                write_provider_install(destination, NEW_VERSION, true).await;
                state.progress = 100;
                state.status = DownloadStatus::Complete;
            }
            DownloadPlan::MissingMarker => {
                write_provider_install(destination, NEW_VERSION, false).await;
                state.progress = 100;
                state.status = DownloadStatus::Complete;
            }
            DownloadPlan::SucceedAfterPolls { polls } => {
                state.polls_remaining = polls;
            }
            DownloadPlan::Fail { .. } | DownloadPlan::Hang => {}
        }

        self.sessions.lock().await.insert(id.clone(), state);
        Ok(id)
    }

    async fn get_session(&self, session_id: &str) -> Result<DownloadSession> {
        let plan = self.plan();
        let mut sessions = self.sessions.lock().await;
        let state = sessions.get_mut(session_id).ok_or_else(|| {
            AppError::NotFound(format!("Download session {} not found", session_id))
        })?;

        match plan {
            DownloadPlan::Succeed | DownloadPlan::MissingMarker => {}
            DownloadPlan::SucceedAfterPolls { .. } => {
                if state.status == DownloadStatus::Downloading {
                    if state.polls_remaining > 0 {
                        state.polls_remaining -= 1;
                        state.progress = (state.progress + 40).min(90);
                    } else {
                        write_provider_install(&state.dest, NEW_VERSION, true).await;
                        state.progress = 100;
                        state.status = DownloadStatus::Complete;
                    }
                }
            }
            DownloadPlan::Fail { error } => {
                state.status = DownloadStatus::Failed;
                state.error = Some(error);
            }
            DownloadPlan::Hang => {
                state.progress = 10;
            }
        }

        Ok(DownloadSession {
            id: session_id.to_string(),
            progress: state.progress,
            status: state.status,
            error: state.error.clone(),
        })
    }

    async fn cancel(&self, session_id: &str) -> Result<()> {
        self.cancelled.lock().unwrap().push(session_id.to_string());
        if let Some(state) = self.sessions.lock().await.get_mut(session_id) {
            state.status = DownloadStatus::Failed;
            state.error = Some("Cancelled".to_string());
        }
        Ok(())
    }
}

/// Notification sink recording everything it is told
#[derive(Default)]
pub struct MockNotifier {
    pub sent: StdMutex<Vec<(NotifyKind, String, String)>>,
}

impl MockNotifier {
    pub fn kinds(&self) -> Vec<NotifyKind> {
        self.sent.lock().unwrap().iter().map(|(k, _, _)| *k).collect()
    }
}

#[async_trait]
impl NotificationSink for MockNotifier {
    async fn notify(&self, kind: NotifyKind, server_name: &str, details: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((kind, server_name.to_string(), details.to_string()));
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Everything a pipeline test needs: database, on-disk fixture, mocks, and
/// the service wired up to all of them.
pub struct TestHarness {
    pub db: DatabaseConnection,
    pub dir: TempDir,
    pub server: server::Model,
    pub svc: ServerUpdateService,
    pub process: Arc<MockProcess>,
    pub backups: Arc<MockBackups>,
    pub downloads: Arc<MockDownloads>,
    pub notifier: Arc<MockNotifier>,
}

impl TestHarness {
    pub async fn new(plan: DownloadPlan) -> Self {
        Self::with_running(plan, true).await
    }

    pub async fn with_running(plan: DownloadPlan, running: bool) -> Self {
        // Must land before the config singleton is first touched
        std::env::set_var("HYPANEL_UPDATE_SETTLE_DELAY_SECS", "0");
        std::env::set_var("HYPANEL_UPDATE_REMOVE_RETRY_BACKOFF_MS", "10");

        let db = create_test_db().await;
        let dir = TempDir::new().expect("Failed to create server root");
        build_server_tree(dir.path(), OLD_VERSION).await;
        let server = create_test_server(&db, "test-server", dir.path(), OLD_VERSION).await;

        let process = Arc::new(MockProcess::new(running));
        let backups = Arc::new(MockBackups::new(dir.path().to_path_buf()));
        let downloads = Arc::new(MockDownloads::new(plan));
        let notifier = Arc::new(MockNotifier::default());

        let svc = ServerUpdateService::new(
            db.clone(),
            process.clone(),
            backups.clone(),
            downloads.clone(),
            notifier.clone(),
        );

        Self {
            db,
            dir,
            server,
            svc,
            process,
            backups,
            downloads,
            notifier,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub async fn reload_server(&self) -> server::Model {
        use sea_orm::EntityTrait;
        hypanel::models::prelude::Server::find_by_id(self.server.id)
            .one(&self.db)
            .await
            .unwrap()
            .expect("Server row disappeared")
    }

    /// Poll the session until it reaches a terminal status.
    pub async fn wait_for_terminal(&self, session_id: &str) -> UpdateSession {
        for _ in 0..600 {
            if let Some(session) = self.svc.get_session(session_id).await {
                if session.status.is_terminal() {
                    return session;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        panic!("Update session never reached a terminal status");
    }

    /// Poll the session until `pred` holds. Panics after ~15 seconds.
    pub async fn wait_for_session<F>(&self, session_id: &str, pred: F) -> UpdateSession
    where
        F: Fn(&UpdateSession) -> bool,
    {
        for _ in 0..600 {
            if let Some(session) = self.svc.get_session(session_id).await {
                if pred(&session) {
                    return session;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        panic!("Update session never reached the expected state");
    }
}

/// Drain whatever events are currently buffered on a subscription.
pub fn drain_events(
    rx: &mut tokio::sync::broadcast::Receiver<hypanel::services::update::UpdateEvent>,
) -> Vec<hypanel::services::update::UpdateEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
