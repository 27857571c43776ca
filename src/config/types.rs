//! Configuration type definitions.

use std::time::Duration;

use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// Discord bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    pub guild_id: u64,
    /// Members holding any of these roles are bridge admins.
    #[serde(default)]
    pub admin_role_ids: Vec<u64>,
    /// Role mentioned in crash notifications.
    #[serde(default)]
    pub crash_role_id: Option<u64>,
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    #[serde(default = "default_max_topic_length")]
    pub max_topic_length: usize,
}

/// Per-channel worker tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    /// Minimum spacing between two metadata updates of one channel.
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,
    /// Upper bound for one metadata update request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Outbound messages held per channel before the oldest are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ChannelsConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// SQLite database settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// A managed game server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_true")]
    pub name_sync: bool,
    #[serde(default = "default_true")]
    pub topic_sync: bool,
}

fn default_max_message_length() -> usize {
    2000
}

fn default_max_topic_length() -> usize {
    1024
}

fn default_update_interval_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_database_path() -> String {
    "fleetcord.db".to_string()
}

fn default_true() -> bool {
    true
}
