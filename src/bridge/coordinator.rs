//! Channel mapping coordinator.
//!
//! Owns the server ↔ channel and name → channel tables together with the
//! per-channel worker pools. Every operation that reads or changes the
//! tables runs under one async lock, so a mapping change and the matching
//! pool usage adjustment are never observed apart. Workers handed out by
//! the pools are used after the lock is released.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serenity::builder::CreateEmbed;
use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::bridge::queue::OutboundQueue;
use crate::bridge::state::MappingState;
use crate::bridge::status::ChannelStatusProvider;
use crate::bridge::updater::{ChannelStatusUpdater, UpdaterSettings};
use crate::common::error::{CoordinatorError, CoordinatorResult, StoreError};
use crate::common::messages::{InboundMessage, ServerMessageEvent};
use crate::common::types::{clip_text, is_valid_channel_name, ServerId, ADMIN_SERVER_ID};
use crate::config::Config;
use crate::discord::transport::{ChatTransport, TextChannel};
use crate::game::ServerLookup;
use crate::store::MappingStore;

/// Capacity of the inbound event broadcast.
const EVENT_CAPACITY: usize = 256;

/// Tunables of the coordinator and the workers it creates.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub guild_id: GuildId,
    pub admin_role_ids: HashSet<RoleId>,
    pub crash_role_id: Option<RoleId>,
    pub max_message_length: usize,
    pub max_topic_length: usize,
    pub queue_capacity: usize,
    pub throttle: Duration,
    pub request_timeout: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            guild_id: GuildId::new(config.discord.guild_id),
            admin_role_ids: config
                .discord
                .admin_role_ids
                .iter()
                .filter(|id| **id != 0)
                .map(|id| RoleId::new(*id))
                .collect(),
            crash_role_id: config
                .discord
                .crash_role_id
                .filter(|id| *id != 0)
                .map(RoleId::new),
            max_message_length: config.discord.max_message_length,
            max_topic_length: config.discord.max_topic_length,
            queue_capacity: config.channels.queue_capacity,
            throttle: config.channels.update_interval(),
            request_timeout: config.channels.request_timeout(),
        }
    }
}

/// Coordinates channel mappings, their persistence and per-channel workers.
pub struct Coordinator {
    state: Mutex<MappingState>,
    store: Arc<dyn MappingStore>,
    lookup: Arc<dyn ServerLookup>,
    transport: Arc<dyn ChatTransport>,
    settings: CoordinatorSettings,
    updater_settings: UpdaterSettings,
    events: broadcast::Sender<ServerMessageEvent>,
}

impl Coordinator {
    pub fn new(
        settings: CoordinatorSettings,
        store: Arc<dyn MappingStore>,
        lookup: Arc<dyn ServerLookup>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        let updater_settings = UpdaterSettings {
            lookup: lookup.clone(),
            transport: transport.clone(),
            provider: Arc::new(ChannelStatusProvider::new(settings.max_topic_length)),
            throttle: settings.throttle,
            request_timeout: settings.request_timeout,
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            state: Mutex::new(MappingState::new()),
            store,
            lookup,
            transport,
            settings,
            updater_settings,
            events,
        }
    }

    /// Load the persisted mappings into memory. Run once at startup.
    pub async fn init(&self) -> CoordinatorResult<()> {
        let mut state = self.state.lock().await;
        let stored = self
            .store
            .load()
            .await
            .map_err(|e| unexpected("init", e))?;

        state.clear();
        for (server_id, channel_id) in &stored.servers {
            if server_id != ADMIN_SERVER_ID && !self.lookup.is_known(server_id) {
                warn!(server_id = %server_id, channel_id = %channel_id, "Mapped server is not configured");
            }
            state.set_server(server_id, *channel_id);
        }
        for (name, channel_id) in &stored.named {
            state.set_named(name, *channel_id);
        }

        info!(
            servers = stored.servers.len(),
            named = stored.named.len(),
            "Loaded channel mappings"
        );
        Ok(())
    }

    /// Map a server to a channel, replacing rows that conflict on either side.
    pub async fn set_server(&self, server_id: &str, channel_id: ChannelId) -> CoordinatorResult<()> {
        if server_id != ADMIN_SERVER_ID && !self.lookup.is_known(server_id) {
            return Err(CoordinatorError::validation(
                "serverKey",
                format!("Unknown server '{}'", server_id),
            ));
        }

        let mut state = self.state.lock().await;
        if !state.set_server(server_id, channel_id) {
            debug!(server_id = %server_id, channel_id = %channel_id, "Server mapping unchanged");
        }
        self.store
            .replace_server_mapping(server_id, channel_id)
            .await
            .map_err(|e| unexpected("set_server", e))?;

        info!(server_id = %server_id, channel_id = %channel_id, "Server mapped to channel");
        Ok(())
    }

    /// Make `channel_id` the admin channel.
    pub async fn set_admin_channel(&self, channel_id: ChannelId) -> CoordinatorResult<()> {
        self.set_server(ADMIN_SERVER_ID, channel_id).await
    }

    /// Remove the server mapping of a channel and return the server it pointed to.
    pub async fn unset_server(&self, channel_id: ChannelId) -> CoordinatorResult<ServerId> {
        let mut state = self.state.lock().await;
        let Some(server_id) = state.remove_server_by_channel(channel_id) else {
            return Err(CoordinatorError::not_found(
                "channelId",
                format!("No server is mapped to channel {}", channel_id),
            ));
        };
        self.store
            .remove_server_mapping(channel_id)
            .await
            .map_err(|e| unexpected("unset_server", e))?;

        info!(server_id = %server_id, channel_id = %channel_id, "Server mapping removed");
        Ok(server_id)
    }

    /// Register `channel_id` under a logical name, replacing that name's row.
    pub async fn set_named_channel(&self, name: &str, channel_id: ChannelId) -> CoordinatorResult<()> {
        validate_name(name)?;

        let mut state = self.state.lock().await;
        state.set_named(name, channel_id);
        self.store
            .replace_named_mapping(name, channel_id)
            .await
            .map_err(|e| unexpected("set_named_channel", e))?;

        info!(name = %name, channel_id = %channel_id, "Named channel set");
        Ok(())
    }

    /// Remove a logical name and return the channel it pointed to.
    pub async fn unset_named_channel(&self, name: &str) -> CoordinatorResult<ChannelId> {
        validate_name(name)?;

        let mut state = self.state.lock().await;
        let Some(channel_id) = state.remove_named(name) else {
            return Err(CoordinatorError::not_found(
                "name",
                format!("No channel is named '{}'", name),
            ));
        };
        self.store
            .remove_named_mapping(name)
            .await
            .map_err(|e| unexpected("unset_named_channel", e))?;

        info!(name = %name, channel_id = %channel_id, "Named channel removed");
        Ok(channel_id)
    }

    pub async fn get_named_channels(&self) -> BTreeMap<String, ChannelId> {
        self.state.lock().await.named_channels()
    }

    pub async fn get_server_channels(&self) -> BTreeMap<ServerId, ChannelId> {
        self.state.lock().await.server_channels()
    }

    pub async fn channel_for_server(&self, server_id: &str) -> Option<ChannelId> {
        self.state.lock().await.channel_for_server(server_id)
    }

    pub async fn server_for_channel(&self, channel_id: ChannelId) -> Option<ServerId> {
        self.state.lock().await.server_for_channel(channel_id).cloned()
    }

    /// Queue a message for the channel mapped to `server_id`.
    pub async fn send_to_connected_channel(
        &self,
        server_id: &str,
        text: Option<String>,
        embed: Option<CreateEmbed>,
    ) {
        self.send(|state| state.channel_for_server(server_id), text, embed)
            .await;
    }

    /// Queue a message for the admin channel.
    pub async fn send_to_admin_channel(&self, text: Option<String>, embed: Option<CreateEmbed>) {
        self.send_to_connected_channel(ADMIN_SERVER_ID, text, embed)
            .await;
    }

    /// Queue a message for the channel registered under `name`.
    pub async fn send_to_named_channel(
        &self,
        name: &str,
        text: Option<String>,
        embed: Option<CreateEmbed>,
    ) {
        self.send(|state| state.channel_for_name(name), text, embed)
            .await;
    }

    /// Ask the updater of the server's channel to refresh name and topic.
    pub async fn schedule_update_channel_name_and_topic(&self, server_id: &str) {
        let updater = {
            let mut state = self.state.lock().await;
            let Some(channel_id) = state.channel_for_server(server_id) else {
                return;
            };
            let Some(channel) = self.transport.text_channel(channel_id).await else {
                debug!(server_id = %server_id, channel_id = %channel_id, "Mapped channel not found");
                return;
            };

            let settings = self.updater_settings.clone();
            let server_id = server_id.to_string();
            state.updaters.get_or_create(
                &channel_id,
                move |channel: TextChannel| {
                    ChannelStatusUpdater::spawn(server_id, channel.id, settings)
                },
                channel,
            )
        };

        if let Some(updater) = updater {
            updater.schedule_update();
        }
    }

    /// Whether the member holds one of the configured admin roles.
    pub async fn is_admin_role(&self, user_id: UserId) -> bool {
        if self.settings.admin_role_ids.is_empty() {
            return false;
        }
        match self
            .transport
            .member_role_ids(self.settings.guild_id, user_id)
            .await
        {
            Some(roles) => roles
                .iter()
                .any(|role| self.settings.admin_role_ids.contains(role)),
            None => false,
        }
    }

    /// Mention string for the crash role, if one is configured.
    pub fn crash_role_mention(&self) -> Option<String> {
        self.settings
            .crash_role_id
            .map(|role_id| format!("<@&{}>", role_id))
    }

    /// Subscribe to chat messages posted in server-mapped channels.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessageEvent> {
        self.events.subscribe()
    }

    /// Raise a server message event for a message received in a mapped channel.
    ///
    /// Returns `false` if the channel is unmapped or is the admin channel.
    pub async fn route_inbound(&self, message: InboundMessage) -> bool {
        let server_id = self
            .state
            .lock()
            .await
            .server_for_channel(message.channel_id)
            .cloned();

        let Some(server_id) = server_id else {
            return false;
        };
        if server_id == ADMIN_SERVER_ID {
            return false;
        }

        debug!(
            server_id = %server_id,
            author_id = %message.author_id,
            author = %message.author_name,
            "Routing chat message to server"
        );
        // No subscribers is not an error
        let _ = self.events.send(ServerMessageEvent { server_id, message });
        true
    }

    /// Dispose every worker. Persisted mappings are left untouched.
    pub async fn shutdown(&self) {
        self.state.lock().await.clear();
        info!("Channel workers stopped");
    }

    async fn send<F>(&self, resolve: F, text: Option<String>, embed: Option<CreateEmbed>)
    where
        F: FnOnce(&MappingState) -> Option<ChannelId>,
    {
        let text = clip_text(text, self.settings.max_message_length);
        if text.is_none() && embed.is_none() {
            return;
        }

        let queue = {
            let mut state = self.state.lock().await;
            let Some(channel_id) = resolve(&*state) else {
                return;
            };
            let Some(channel) = self.transport.text_channel(channel_id).await else {
                debug!(channel_id = %channel_id, "Mapped channel not found, dropping message");
                return;
            };

            let transport = self.transport.clone();
            let capacity = self.settings.queue_capacity;
            let max_length = self.settings.max_message_length;
            state.queues.get_or_create(
                &channel_id,
                move |channel: TextChannel| {
                    OutboundQueue::spawn(channel.id, transport, capacity, max_length)
                },
                channel,
            )
        };

        if let Some(queue) = queue {
            queue.enqueue(text, embed);
        }
    }
}

fn validate_name(name: &str) -> CoordinatorResult<()> {
    if is_valid_channel_name(name) {
        Ok(())
    } else {
        Err(CoordinatorError::validation(
            "name",
            "Channel name must be non-empty and contain no whitespace",
        ))
    }
}

fn unexpected(operation: &'static str, e: StoreError) -> CoordinatorError {
    error!(operation, "Failed to persist channel mappings: {:?}", e);
    CoordinatorError::Unexpected(e)
}
