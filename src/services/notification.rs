//! Best-effort external alerting for update lifecycle events.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Kinds of events forwarded to the notification sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    UpdateStarted,
    UpdateCompleted,
    UpdateFailed,
    UpdateRolledBack,
}

impl NotifyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyKind::UpdateStarted => "update_started",
            NotifyKind::UpdateCompleted => "update_completed",
            NotifyKind::UpdateFailed => "update_failed",
            NotifyKind::UpdateRolledBack => "update_rolled_back",
        }
    }
}

impl std::fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fire-and-forget notification sink. Implementations must swallow their own
/// failures; a broken sink must never abort the pipeline.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, kind: NotifyKind, server_name: &str, details: &str);
}

/// Sink that drops every notification. Useful when no channel is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl NotificationSink for NullNotifier {
    async fn notify(&self, kind: NotifyKind, server_name: &str, details: &str) {
        tracing::debug!(kind = %kind, server = server_name, details, "Notification dropped (no sink configured)");
    }
}

/// Posts update events as JSON to a configured webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(&self, kind: NotifyKind, server_name: &str, details: &str) {
        let payload = serde_json::json!({
            "event": kind.as_str(),
            "server": server_name,
            "details": details,
            "timestamp": chrono::Utc::now(),
        });

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), kind = %kind, "Webhook notification rejected");
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = %kind, "Webhook notification failed");
            }
        }
    }
}
