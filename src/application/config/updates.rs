use std::env;

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Tunables for the server update pipeline
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Seconds to wait after a process stop so file handles are released
    pub settle_delay_secs: u64,
    /// Hard ceiling on how long a download may take
    pub download_timeout_secs: u64,
    /// Tick of the download completion poll loop
    pub download_poll_interval_secs: u64,
    /// Attempts for removing locked files during the wipe step
    pub remove_retry_attempts: u32,
    /// Backoff between removal attempts, in milliseconds
    pub remove_retry_backoff_ms: u64,
    /// How often the auto-check task looks for new versions
    pub auto_check_interval_mins: u64,
    /// Default bound on update history queries
    pub history_limit: u64,
}

impl UpdateConfig {
    pub fn from_env() -> Self {
        Self {
            settle_delay_secs: env_u64("HYPANEL_UPDATE_SETTLE_DELAY_SECS", 2),
            download_timeout_secs: env_u64("HYPANEL_UPDATE_DOWNLOAD_TIMEOUT_SECS", 30 * 60),
            download_poll_interval_secs: env_u64("HYPANEL_UPDATE_DOWNLOAD_POLL_SECS", 1),
            remove_retry_attempts: env_u32("HYPANEL_UPDATE_REMOVE_RETRY_ATTEMPTS", 5),
            remove_retry_backoff_ms: env_u64("HYPANEL_UPDATE_REMOVE_RETRY_BACKOFF_MS", 1000),
            auto_check_interval_mins: env_u64("HYPANEL_UPDATE_AUTO_CHECK_INTERVAL_MINS", 60),
            history_limit: env_u64("HYPANEL_UPDATE_HISTORY_LIMIT", 20),
        }
    }
}
