//! Application composition root: logging setup and state assembly.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::application::config::CONFIG;
use crate::application::database;
use crate::application::error::Result;
use crate::application::state::AppState;
use crate::services::update::ServerUpdateService;
use crate::services::{BackupService, DownloadProvider, NotificationSink, ProcessController};

/// Initialise the tracing subscriber from `RUST_LOG` or the configured log
/// level. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&CONFIG.log_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Connect to the configured database and assemble the application state.
pub async fn bootstrap(
    process: Arc<dyn ProcessController>,
    backups: Arc<dyn BackupService>,
    downloads: Arc<dyn DownloadProvider>,
    notifier: Arc<dyn NotificationSink>,
) -> Result<AppState> {
    bootstrap_with_url(
        &CONFIG.database.database_url,
        process,
        backups,
        downloads,
        notifier,
    )
    .await
}

/// Like [`bootstrap`], but against a specific database URL.
pub async fn bootstrap_with_url(
    database_url: &str,
    process: Arc<dyn ProcessController>,
    backups: Arc<dyn BackupService>,
    downloads: Arc<dyn DownloadProvider>,
    notifier: Arc<dyn NotificationSink>,
) -> Result<AppState> {
    let db = database::connect_with_url(database_url).await?;
    let updates = ServerUpdateService::new(db.clone(), process, backups, downloads, notifier);
    Ok(AppState::new(db, updates))
}
