use sea_orm::DatabaseConnection;
use tokio::sync::broadcast;

use crate::services::update::{ServerUpdateService, UpdateEvent};

/// Database connection type alias
pub type DbConn = DatabaseConnection;

/// Broadcast channel carrying update pipeline events to any number of
/// subscribers (WebSocket relays, tests, the auto-check task)
pub type UpdateBroadcast = broadcast::Sender<UpdateEvent>;

/// Application state containing all shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DbConn,
    pub updates: ServerUpdateService,
}

impl AppState {
    pub fn new(db: DbConn, updates: ServerUpdateService) -> Self {
        Self { db, updates }
    }
}
