//! Hot-reloadable server configuration, loaded from `ServerConfig.json` the
//! same way the teacher's `lobby::reload_config` hot-reloads `GameConfig.json`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;

/// The on-disk shape of `ServerConfig.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the User Directory service (spec §6).
    pub user_directory_url: String,
    /// Seconds the matchmaker waits for a second human before looping again.
    pub matchmaker_tick_seconds: u64,
    /// Matchmaker ticks before giving up on a human match and spawning a bot.
    pub matchmaker_bot_after_ticks: u32,
    /// Chat history entries kept per lobby, per spec §3 (ring buffer).
    pub chat_history_limit: usize,
    /// Seconds a presence/chat-history/search-pool entry lives before expiry.
    pub presence_ttl_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            user_directory_url: "http://127.0.0.1:9000".into(),
            matchmaker_tick_seconds: 5,
            matchmaker_bot_after_ticks: 6,
            chat_history_limit: 1000,
            presence_ttl_seconds: 24 * 60 * 60,
        }
    }
}

/// Holds the live config behind a lock so `/reload` can swap it without a
/// restart, mirroring [`AppState::configs`](crate::lobby::AppState).
#[derive(Default)]
pub struct ConfigHandle(pub RwLock<ServerConfig>);

impl ConfigHandle {
    pub async fn snapshot(&self) -> ServerConfig {
        self.0.read().await.clone()
    }
}

/// Reads and parses `ServerConfig.json`, replacing whatever config was
/// loaded before. Errors are returned as display strings so HTTP handlers
/// can surface them directly, as the teacher's `reload_config` does.
pub async fn reload_config(handle: &Arc<ConfigHandle>) -> Result<(), String> {
    let json_content = fs::read_to_string("ServerConfig.json")
        .await
        .map_err(|e| format!("Failed to read file: {}", e))?;
    let parsed: ServerConfig =
        serde_json::from_str(&json_content).map_err(|e| format!("Failed to parse JSON: {}", e))?;

    {
        let mut config = handle.0.write().await;
        *config = parsed;
    }
    Ok(())
}
