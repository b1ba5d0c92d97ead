use async_trait::async_trait;

use crate::error::Result;

/// Controls the lifecycle of a managed Hytale server process.
///
/// Implemented by the process-manager layer that owns the actual child
/// processes; the update pipeline only consumes it.
#[async_trait]
pub trait ProcessController: Send + Sync {
    /// Whether the server process is currently running.
    async fn is_running(&self, server_id: i64) -> bool;

    /// Stop the server process, returning once it has exited.
    async fn stop(&self, server_id: i64) -> Result<()>;

    /// Start the server process, returning once it has launched.
    async fn start(&self, server_id: i64) -> Result<()>;
}
