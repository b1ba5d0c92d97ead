//! Automatic periodic version checks.
//!
//! A background loop that re-runs the all-servers version check on a fixed
//! interval, raises an alert for each server whose available version changed,
//! and broadcasts a batch event listing everything currently updatable.

use std::collections::HashMap;

use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::config::CONFIG;
use crate::models::alert::{self, AlertSeverity};
use crate::models::prelude::*;

use super::session::{AvailableUpdate, UpdateEvent};
use super::ServerUpdateService;

/// Handle to the running auto-check loop. Dropping it leaves the loop
/// running; call [`stop`](Self::stop) for an orderly shutdown.
pub struct AutoCheckHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AutoCheckHandle {
    /// Signal the loop to exit and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

impl ServerUpdateService {
    /// Start the periodic auto-check loop at the configured interval. The
    /// first check runs immediately so a fresh process has version info
    /// without waiting a full period.
    pub fn start_auto_check(&self) -> AutoCheckHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let svc = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(
                CONFIG.updates.auto_check_interval_mins.max(1) * 60,
            ));

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = svc.run_auto_check().await {
                            tracing::error!(error = %e, "Automatic version check failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::debug!("Auto-check loop stopping");
                        return;
                    }
                }
            }
        });

        tracing::info!(
            interval_mins = CONFIG.updates.auto_check_interval_mins,
            "Automatic version checks started"
        );
        AutoCheckHandle { shutdown, task }
    }

    /// One auto-check pass. Alerts are raised only for servers whose
    /// available version changed since the last pass, so a pending update
    /// does not re-alert every period.
    pub async fn run_auto_check(&self) -> anyhow::Result<()> {
        let previous: HashMap<i64, Option<String>> = Server::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(|s| (s.id, s.available_version))
            .collect();

        let results = self.check_all_for_updates().await?;

        let mut available = Vec::new();
        for result in results {
            let Some(version) = result.available_version.clone() else {
                continue;
            };

            available.push(AvailableUpdate {
                server_id: result.server_id,
                name: result.server_name.clone(),
                current_version: result.current_version.clone(),
                available_version: version.clone(),
            });

            let already_known = previous
                .get(&result.server_id)
                .map(|prev| prev.as_deref() == Some(version.as_str()))
                .unwrap_or(false);
            if already_known {
                continue;
            }

            alert::ActiveModel {
                server_id: Set(Some(result.server_id)),
                severity: Set(AlertSeverity::Info.to_string()),
                title: Set("Server update available".to_string()),
                message: Set(format!(
                    "Server '{}' can be updated from {} to {}",
                    result.server_name, result.current_version, version
                )),
                created_at: Set(chrono::Utc::now()),
                ..Default::default()
            }
            .insert(&self.db)
            .await?;

            tracing::info!(
                server = %result.server_name,
                current = %result.current_version,
                available = %version,
                "Update available"
            );
        }

        if !available.is_empty() {
            self.emit(UpdateEvent::UpdatesAvailable { servers: available });
        }

        Ok(())
    }
}
