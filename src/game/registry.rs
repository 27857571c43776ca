//! Live state of the managed game servers.
//!
//! Each server's state sits behind its own async mutex; readers take a
//! [`ServerSnapshot`] while holding it so every field comes from the same
//! moment.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serenity::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::common::types::ServerSnapshot;
use crate::config::types::ServerConfig;

/// Read access to server state, as needed by the bridge.
#[async_trait]
pub trait ServerLookup: Send + Sync {
    /// Whether `server_id` names a configured server.
    fn is_known(&self, server_id: &str) -> bool;

    /// Snapshot of the server's live state. `None` for unknown servers and
    /// for servers whose state has not been reported yet.
    async fn snapshot(&self, server_id: &str) -> Option<ServerSnapshot>;
}

/// Mutable live state of one server.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub name: String,
    pub version: String,
    pub running: bool,
    pub name_sync: bool,
    pub topic_sync: bool,
    pub players: BTreeMap<String, usize>,
    /// Set by the first running/stopped report. Until then the state is
    /// only what the config says, not what the server is doing.
    pub reported: bool,
}

impl From<&ServerConfig> for ServerState {
    fn from(config: &ServerConfig) -> Self {
        Self {
            name: config.name.clone(),
            version: config.version.clone(),
            running: false,
            name_sync: config.name_sync,
            topic_sync: config.topic_sync,
            players: BTreeMap::new(),
            reported: false,
        }
    }
}

/// Registry of all configured servers.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    servers: HashMap<String, Arc<Mutex<ServerState>>>,
}

impl ServerRegistry {
    pub fn from_config(servers: &[ServerConfig]) -> Self {
        let servers = servers
            .iter()
            .map(|s| (s.id.clone(), Arc::new(Mutex::new(ServerState::from(s)))))
            .collect();
        Self { servers }
    }

    /// Exclusive access to a server's live state.
    pub async fn lock(&self, server_id: &str) -> Option<OwnedMutexGuard<ServerState>> {
        let state = self.servers.get(server_id)?.clone();
        Some(state.lock_owned().await)
    }

    /// Ids of all configured servers.
    pub fn server_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.servers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Record a server starting or stopping. Stopping clears the roster.
    pub async fn set_running(&self, server_id: &str, running: bool) -> bool {
        let Some(mut state) = self.lock(server_id).await else {
            return false;
        };
        state.running = running;
        state.reported = true;
        if !running {
            state.players.clear();
        }
        debug!(server_id = %server_id, running, "Server state changed");
        true
    }

    /// Replace the online roster of a server.
    pub async fn set_players<I>(&self, server_id: &str, players: I) -> bool
    where
        I: IntoIterator<Item = String>,
    {
        let Some(mut state) = self.lock(server_id).await else {
            return false;
        };
        state.players.clear();
        for name in players {
            *state.players.entry(name).or_insert(0) += 1;
        }
        true
    }

    pub async fn set_version(&self, server_id: &str, version: impl Into<String>) -> bool {
        let Some(mut state) = self.lock(server_id).await else {
            return false;
        };
        state.version = version.into();
        true
    }
}

#[async_trait]
impl ServerLookup for ServerRegistry {
    fn is_known(&self, server_id: &str) -> bool {
        self.servers.contains_key(server_id)
    }

    async fn snapshot(&self, server_id: &str) -> Option<ServerSnapshot> {
        let state = self.lock(server_id).await?;
        if !state.reported {
            return None;
        }
        Some(ServerSnapshot {
            server_id: server_id.to_string(),
            name: state.name.clone(),
            version: state.version.clone(),
            running: state.running,
            name_sync: state.name_sync,
            topic_sync: state.topic_sync,
            players: state.players.clone(),
        })
    }
}
