//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use std::collections::HashSet;

use crate::common::error::ConfigError;
use crate::common::types::ADMIN_SERVER_ID;
use crate::config::types::Config;

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // Validate Discord config
    if config.discord.token.is_empty() {
        errors.push("discord.token is required".to_string());
    }
    if config.discord.token == "YOUR_DISCORD_TOKEN_HERE" {
        errors.push("discord.token has not been configured (still using placeholder)".to_string());
    }
    if config.discord.guild_id == 0 {
        errors.push("discord.guild_id must be non-zero".to_string());
    }
    if config.discord.max_message_length == 0 {
        errors.push("discord.max_message_length must be non-zero".to_string());
    }
    // Truncated topics end with "...", so there must be room for it
    if config.discord.max_topic_length <= 3 {
        errors.push(format!(
            "discord.max_topic_length must be greater than 3 (got {})",
            config.discord.max_topic_length
        ));
    }

    // Validate channel worker settings
    if config.channels.update_interval_secs == 0 {
        errors.push("channels.update_interval_secs must be non-zero".to_string());
    }
    if config.channels.request_timeout_secs == 0 {
        errors.push("channels.request_timeout_secs must be non-zero".to_string());
    }
    if config.channels.queue_capacity == 0 {
        errors.push("channels.queue_capacity must be non-zero".to_string());
    }

    if config.database.path.is_empty() {
        errors.push("database.path is required".to_string());
    }

    // Validate servers
    let mut seen = HashSet::new();
    for (i, server) in config.servers.iter().enumerate() {
        if server.id.is_empty() {
            errors.push(format!("servers[{}].id is required", i));
        } else if server.id == ADMIN_SERVER_ID {
            errors.push(format!(
                "servers[{}].id '{}' is reserved for the admin channel",
                i, server.id
            ));
        } else if !seen.insert(server.id.as_str()) {
            errors.push(format!("servers[{}].id '{}' is duplicated", i, server.id));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}
