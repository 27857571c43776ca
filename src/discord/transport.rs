//! Chat transport seam.
//!
//! The bridge workers only talk to Discord through [`ChatTransport`], which
//! keeps them testable without a gateway connection.

use std::sync::{Arc, PoisonError, RwLock};

use serenity::async_trait;
use serenity::builder::{CreateEmbed, CreateMessage, EditChannel};
use serenity::cache::Cache;
use serenity::http::Http;
use serenity::model::channel::{Channel, ChannelType};
use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};
use tracing::debug;

use crate::common::error::{DiscordError, DiscordResult};
use crate::common::types::ChannelStatus;

/// A resolved guild text channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChannel {
    pub id: ChannelId,
    pub name: String,
}

/// Operations the bridge needs from the chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Look up a live text channel. `None` if it does not exist or is not text.
    async fn text_channel(&self, channel_id: ChannelId) -> Option<TextChannel>;

    /// Post one message made of optional text and an optional embed.
    async fn send_message(
        &self,
        channel_id: ChannelId,
        text: Option<String>,
        embed: Option<CreateEmbed>,
    ) -> DiscordResult<()>;

    /// Change a channel's name and/or topic. `None` fields are left alone.
    async fn edit_channel(&self, channel_id: ChannelId, status: &ChannelStatus)
        -> DiscordResult<()>;

    /// Role ids of a guild member, `None` if the member can't be found.
    async fn member_role_ids(&self, guild_id: GuildId, user_id: UserId) -> Option<Vec<RoleId>>;
}

#[derive(Clone)]
struct Handles {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

/// Transport backed by serenity's HTTP client and gateway cache.
///
/// Serenity's HTTP client queues requests behind Discord's rate limits, so
/// callers never see 429 responses. The handles are swapped whenever the
/// bot rebuilds its client after a failed connection.
pub struct SerenityTransport {
    handles: RwLock<Handles>,
}

impl SerenityTransport {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self {
            handles: RwLock::new(Handles { http, cache }),
        }
    }

    /// Point the transport at a rebuilt client.
    pub fn rebind(&self, http: Arc<Http>, cache: Arc<Cache>) {
        *self.handles.write().unwrap_or_else(PoisonError::into_inner) = Handles { http, cache };
    }

    fn handles(&self) -> Handles {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ChatTransport for SerenityTransport {
    async fn text_channel(&self, channel_id: ChannelId) -> Option<TextChannel> {
        let Handles { http, cache } = self.handles();
        match channel_id.to_channel((&cache, http.as_ref())).await {
            Ok(Channel::Guild(channel))
                if matches!(channel.kind, ChannelType::Text | ChannelType::News) =>
            {
                Some(TextChannel {
                    id: channel.id,
                    name: channel.name,
                })
            }
            Ok(_) => {
                debug!(channel_id = %channel_id, "Channel is not a guild text channel");
                None
            }
            Err(e) => {
                debug!(channel_id = %channel_id, "Failed to resolve channel: {}", e);
                None
            }
        }
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        text: Option<String>,
        embed: Option<CreateEmbed>,
    ) -> DiscordResult<()> {
        if text.is_none() && embed.is_none() {
            return Err(DiscordError::SendFailed {
                message: "message has neither text nor embed".to_string(),
            });
        }

        let mut builder = CreateMessage::new();
        if let Some(text) = text {
            builder = builder.content(text);
        }
        if let Some(embed) = embed {
            builder = builder.embed(embed);
        }

        let http = self.handles().http;
        channel_id.send_message(http.as_ref(), builder).await?;
        Ok(())
    }

    async fn edit_channel(
        &self,
        channel_id: ChannelId,
        status: &ChannelStatus,
    ) -> DiscordResult<()> {
        let mut builder = EditChannel::new();
        if let Some(ref name) = status.name {
            builder = builder.name(name);
        }
        if let Some(ref topic) = status.topic {
            builder = builder.topic(topic);
        }

        let http = self.handles().http;
        channel_id.edit(http.as_ref(), builder).await?;
        Ok(())
    }

    async fn member_role_ids(&self, guild_id: GuildId, user_id: UserId) -> Option<Vec<RoleId>> {
        let Handles { http, cache } = self.handles();
        match guild_id.member((&cache, http.as_ref()), user_id).await {
            Ok(member) => Some(member.roles),
            Err(e) => {
                debug!(user_id = %user_id, "Failed to fetch guild member: {}", e);
                None
            }
        }
    }
}
