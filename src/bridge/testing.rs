//! Test doubles for the bridge workers and coordinator.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serenity::async_trait;
use serenity::builder::CreateEmbed;
use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};
use tokio::sync::watch;

use crate::common::error::{DiscordError, DiscordResult, StoreError, StoreResult};
use crate::common::types::{ChannelStatus, ServerSnapshot};
use crate::discord::transport::{ChatTransport, TextChannel};
use crate::game::ServerLookup;
use crate::store::{MappingStore, StoredMappings};

/// A message as seen by [`RecordingTransport`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel_id: ChannelId,
    pub text: Option<String>,
    pub embed_title: Option<String>,
}

/// Poll `condition` until it holds. Gives up after about five seconds.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..5000 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    condition()
}

fn embed_title(embed: &CreateEmbed) -> Option<String> {
    let value = serde_json::to_value(embed).ok()?;
    value.get("title")?.as_str().map(str::to_string)
}

/// Transport that records calls and can stall, fail or hang on demand.
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    edits: Mutex<Vec<(ChannelId, ChannelStatus)>>,
    edit_attempts: AtomicUsize,
    channel_lookups: AtomicUsize,
    missing_channels: Mutex<HashSet<ChannelId>>,
    member_roles: Mutex<HashMap<UserId, Vec<RoleId>>>,
    send_gate: watch::Sender<bool>,
    fail_sends: AtomicBool,
    fail_edits: AtomicBool,
    hang_edits: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        let (send_gate, _) = watch::channel(true);
        Self {
            sent: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            edit_attempts: AtomicUsize::new(0),
            channel_lookups: AtomicUsize::new(0),
            missing_channels: Mutex::new(HashSet::new()),
            member_roles: Mutex::new(HashMap::new()),
            send_gate,
            fail_sends: AtomicBool::new(false),
            fail_edits: AtomicBool::new(false),
            hang_edits: AtomicBool::new(false),
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, channel_id: ChannelId) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.channel_id == channel_id)
            .collect()
    }

    /// Successful edits.
    pub fn edits(&self) -> Vec<(ChannelId, ChannelStatus)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn edit_attempts(&self) -> usize {
        self.edit_attempts.load(Ordering::SeqCst)
    }

    pub fn channel_lookups(&self) -> usize {
        self.channel_lookups.load(Ordering::SeqCst)
    }

    /// Block every send until [`release_sends`](Self::release_sends).
    pub fn hold_sends(&self) {
        self.send_gate.send_replace(false);
    }

    pub fn release_sends(&self) {
        self.send_gate.send_replace(true);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    /// Make edits never complete.
    pub fn hang_edits(&self, hang: bool) {
        self.hang_edits.store(hang, Ordering::SeqCst);
    }

    /// Make a channel unresolvable.
    pub fn remove_channel(&self, channel_id: ChannelId) {
        self.missing_channels.lock().unwrap().insert(channel_id);
    }

    pub fn set_member_roles(&self, user_id: UserId, roles: Vec<RoleId>) {
        self.member_roles.lock().unwrap().insert(user_id, roles);
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn text_channel(&self, channel_id: ChannelId) -> Option<TextChannel> {
        self.channel_lookups.fetch_add(1, Ordering::SeqCst);
        if self.missing_channels.lock().unwrap().contains(&channel_id) {
            return None;
        }
        Some(TextChannel {
            id: channel_id,
            name: format!("channel-{}", channel_id),
        })
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        text: Option<String>,
        embed: Option<CreateEmbed>,
    ) -> DiscordResult<()> {
        let mut gate = self.send_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(DiscordError::SendFailed {
                message: "simulated failure".to_string(),
            });
        }

        self.sent.lock().unwrap().push(SentMessage {
            channel_id,
            text,
            embed_title: embed.as_ref().and_then(embed_title),
        });
        Ok(())
    }

    async fn edit_channel(
        &self,
        channel_id: ChannelId,
        status: &ChannelStatus,
    ) -> DiscordResult<()> {
        self.edit_attempts.fetch_add(1, Ordering::SeqCst);

        if self.hang_edits.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(DiscordError::ChannelNotFound {
                channel_id: channel_id.get(),
            });
        }

        self.edits.lock().unwrap().push((channel_id, status.clone()));
        Ok(())
    }

    async fn member_role_ids(&self, _guild_id: GuildId, user_id: UserId) -> Option<Vec<RoleId>> {
        self.member_roles.lock().unwrap().get(&user_id).cloned()
    }
}

/// Fixed set of server snapshots.
pub struct StaticServers {
    servers: Mutex<HashMap<String, ServerSnapshot>>,
}

impl StaticServers {
    pub fn new() -> Self {
        Self {
            servers: Mutex::new(HashMap::new()),
        }
    }

    /// A running "[EU] My Server" on version 1.1.80 with both syncs on.
    pub fn with_running(server_id: &str) -> Self {
        let servers = Self::new();
        servers.add(server_id, true);
        servers
    }

    pub fn add(&self, server_id: &str, running: bool) {
        self.servers.lock().unwrap().insert(
            server_id.to_string(),
            ServerSnapshot {
                server_id: server_id.to_string(),
                name: "[EU] My Server".to_string(),
                version: "1.1.80".to_string(),
                running,
                name_sync: true,
                topic_sync: true,
                players: Default::default(),
            },
        );
    }

    pub fn set_sync(&self, server_id: &str, name_sync: bool, topic_sync: bool) {
        if let Some(snapshot) = self.servers.lock().unwrap().get_mut(server_id) {
            snapshot.name_sync = name_sync;
            snapshot.topic_sync = topic_sync;
        }
    }
}

#[async_trait]
impl ServerLookup for StaticServers {
    fn is_known(&self, server_id: &str) -> bool {
        self.servers.lock().unwrap().contains_key(server_id)
    }

    async fn snapshot(&self, server_id: &str) -> Option<ServerSnapshot> {
        self.servers.lock().unwrap().get(server_id).cloned()
    }
}

/// Store whose writes always fail.
pub struct FailingStore;

#[async_trait]
impl MappingStore for FailingStore {
    async fn load(&self) -> StoreResult<StoredMappings> {
        Ok(StoredMappings::default())
    }

    async fn replace_server_mapping(&self, _: &str, _: ChannelId) -> StoreResult<()> {
        Err(StoreError::Sqlx(sqlx::Error::PoolClosed))
    }

    async fn remove_server_mapping(&self, _: ChannelId) -> StoreResult<()> {
        Err(StoreError::Sqlx(sqlx::Error::PoolClosed))
    }

    async fn replace_named_mapping(&self, _: &str, _: ChannelId) -> StoreResult<()> {
        Err(StoreError::Sqlx(sqlx::Error::PoolClosed))
    }

    async fn remove_named_mapping(&self, _: &str) -> StoreResult<()> {
        Err(StoreError::Sqlx(sqlx::Error::PoolClosed))
    }
}
