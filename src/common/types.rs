//! Shared types used across the application.

use std::collections::BTreeMap;

/// Reserved pseudo-server id under which the admin channel is mapped.
pub const ADMIN_SERVER_ID: &str = "__admin__";

/// Identifier of a managed game server.
pub type ServerId = String;

/// Point-in-time copy of a server's live state.
///
/// Produced by the server registry while holding the server's lock, so the
/// fields are mutually consistent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSnapshot {
    pub server_id: ServerId,
    /// Configured display name, may carry bracket tags like `[EU]`.
    pub name: String,
    /// Game version string, e.g. `1.1.80`.
    pub version: String,
    pub running: bool,
    /// Keep the channel name in sync with the server.
    pub name_sync: bool,
    /// Keep the channel topic in sync with the player roster.
    pub topic_sync: bool,
    /// Online players by name, with the number of sessions each.
    pub players: BTreeMap<String, usize>,
}

impl ServerSnapshot {
    /// Total number of online player sessions.
    pub fn online_count(&self) -> usize {
        self.players.values().sum()
    }
}

/// Desired channel metadata. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStatus {
    pub name: Option<String>,
    pub topic: Option<String>,
}

impl ChannelStatus {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.topic.is_none()
    }
}

/// Validate a logical channel name: non-empty and free of whitespace.
pub fn is_valid_channel_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(char::is_whitespace)
}

/// Canonical key for a logical channel name (names are case-insensitive).
pub fn channel_name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Clip text to at most `max_chars` characters. Blank text becomes `None`.
pub fn clip_text(text: Option<String>, max_chars: usize) -> Option<String> {
    let text = text?;
    if text.trim().is_empty() {
        return None;
    }
    if text.chars().count() > max_chars {
        Some(text.chars().take(max_chars).collect())
    } else {
        Some(text)
    }
}
