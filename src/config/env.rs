//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `FLEETCORD_DISCORD_TOKEN` - Discord bot token
//! - `FLEETCORD_DISCORD_GUILD_ID` - Discord guild id
//! - `FLEETCORD_DATABASE_PATH` - SQLite database path

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "FLEETCORD";

/// Apply environment variable overrides to a config.
///
/// This allows the bot token to be provided via the environment
/// instead of the config file.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(token) = env::var(format!("{}_DISCORD_TOKEN", ENV_PREFIX)) {
        config.discord.token = token;
    }

    if let Ok(guild_id) = env::var(format!("{}_DISCORD_GUILD_ID", ENV_PREFIX)) {
        if let Ok(id) = guild_id.parse() {
            config.discord.guild_id = id;
        }
    }

    if let Ok(path) = env::var(format!("{}_DATABASE_PATH", ENV_PREFIX)) {
        config.database.path = path;
    }

    config
}

/// Get the config file path from environment or use default.
///
/// Checks `FLEETCORD_CONFIG` environment variable, otherwise returns "fleetcord.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "fleetcord.conf".to_string())
}
