//! Canonical message types flowing through the bridge.

use serenity::builder::CreateEmbed;
use serenity::model::id::{ChannelId, UserId};

use crate::common::types::ServerId;

/// A queued outbound message for one channel.
///
/// At least one of `text` or `embed` is set by the time it reaches a queue.
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    pub text: Option<String>,
    pub embed: Option<CreateEmbed>,
}

/// A message received in a chat channel, as reported by the gateway.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel_id: ChannelId,
    pub author_id: UserId,
    /// Display name of the author (nickname if set).
    pub author_name: String,
    pub content: String,
}

/// A chat message posted in a channel that is mapped to a server.
#[derive(Debug, Clone)]
pub struct ServerMessageEvent {
    pub server_id: ServerId,
    pub message: InboundMessage,
}
