pub mod database;
pub mod updates;

use once_cell::sync::Lazy;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: database::DatabaseConfig,
    pub updates: updates::UpdateConfig,

    // Build info
    pub version: String,

    // Logging
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database: database::DatabaseConfig::from_env(),
            updates: updates::UpdateConfig::from_env(),

            version: env!("CARGO_PKG_VERSION").to_string(),

            log_level: env::var("HYPANEL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);
