//! In-memory mapping tables and the worker pools they drive.
//!
//! `MappingState` is only ever reached through the coordinator's lock, so
//! every table change and its pool usage adjustment land together.

use std::collections::{BTreeMap, HashMap};

use serenity::model::id::ChannelId;

use crate::bridge::pool::ResourcePool;
use crate::bridge::queue::OutboundQueue;
use crate::bridge::updater::ChannelStatusUpdater;
use crate::common::types::{channel_name_key, ServerId};

#[derive(Debug, Clone)]
struct NamedChannel {
    /// Name as it was registered.
    name: String,
    channel_id: ChannelId,
}

/// Mapping tables plus the per-channel worker pools.
///
/// Every server row counts as one usage in both pools; every named row as
/// one usage in the queue pool.
#[derive(Default)]
pub struct MappingState {
    server_channels: HashMap<ServerId, ChannelId>,
    channel_servers: HashMap<ChannelId, ServerId>,
    named_channels: HashMap<String, NamedChannel>,
    pub(crate) queues: ResourcePool<ChannelId, OutboundQueue>,
    pub(crate) updaters: ResourcePool<ChannelId, ChannelStatusUpdater>,
}

impl MappingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_for_server(&self, server_id: &str) -> Option<ChannelId> {
        self.server_channels.get(server_id).copied()
    }

    pub fn server_for_channel(&self, channel_id: ChannelId) -> Option<&ServerId> {
        self.channel_servers.get(&channel_id)
    }

    pub fn channel_for_name(&self, name: &str) -> Option<ChannelId> {
        self.named_channels
            .get(&channel_name_key(name))
            .map(|n| n.channel_id)
    }

    pub fn server_channels(&self) -> BTreeMap<ServerId, ChannelId> {
        self.server_channels
            .iter()
            .map(|(s, c)| (s.clone(), *c))
            .collect()
    }

    pub fn named_channels(&self) -> BTreeMap<String, ChannelId> {
        self.named_channels
            .values()
            .map(|n| (n.name.clone(), n.channel_id))
            .collect()
    }

    /// Map `server_id` to `channel_id`, evicting rows that conflict on either side.
    ///
    /// Returns `false` if the exact row already existed (nothing changed).
    pub fn set_server(&mut self, server_id: &str, channel_id: ChannelId) -> bool {
        if self.channel_for_server(server_id) == Some(channel_id) {
            return false;
        }

        let replaced_channel = self.server_channels.remove(server_id);
        if let Some(old) = replaced_channel {
            self.channel_servers.remove(&old);
        }
        let replaced_server = self.channel_servers.remove(&channel_id);
        if let Some(ref old) = replaced_server {
            self.server_channels.remove(old);
        }

        self.server_channels
            .insert(server_id.to_string(), channel_id);
        self.channel_servers
            .insert(channel_id, server_id.to_string());

        // Queues survive a change of owner; updaters are bound to their
        // server, so a re-owned channel gets a fresh one.
        self.queues.add_usage(channel_id);
        if let Some(old) = replaced_channel {
            self.queues.remove_usage(&old);
            self.updaters.remove_usage(&old);
        }
        if replaced_server.is_some() {
            self.queues.remove_usage(&channel_id);
            self.updaters.remove_usage(&channel_id);
        }
        self.updaters.add_usage(channel_id);

        true
    }

    /// Remove the server row for `channel_id`, returning its server id.
    pub fn remove_server_by_channel(&mut self, channel_id: ChannelId) -> Option<ServerId> {
        let server_id = self.channel_servers.remove(&channel_id)?;
        self.server_channels.remove(&server_id);

        self.queues.remove_usage(&channel_id);
        self.updaters.remove_usage(&channel_id);
        Some(server_id)
    }

    /// Map a logical name to `channel_id`, replacing the row with the same name.
    ///
    /// Returns `false` if the exact row already existed.
    pub fn set_named(&mut self, name: &str, channel_id: ChannelId) -> bool {
        let key = channel_name_key(name);
        let entry = NamedChannel {
            name: name.to_string(),
            channel_id,
        };

        let replaced = self.named_channels.insert(key, entry);
        if replaced.as_ref().map(|r| r.channel_id) == Some(channel_id) {
            return false;
        }

        self.queues.add_usage(channel_id);
        if let Some(old) = replaced {
            self.queues.remove_usage(&old.channel_id);
        }
        true
    }

    /// Remove the row for `name`, returning the channel it pointed to.
    pub fn remove_named(&mut self, name: &str) -> Option<ChannelId> {
        let removed = self.named_channels.remove(&channel_name_key(name))?;
        self.queues.remove_usage(&removed.channel_id);
        Some(removed.channel_id)
    }

    /// Drop every row and dispose every worker.
    pub fn clear(&mut self) {
        self.server_channels.clear();
        self.channel_servers.clear();
        self.named_channels.clear();
        self.queues.clear();
        self.updaters.clear();
    }

    /// Check that pool usage counts match the mapping rows.
    #[cfg(test)]
    pub fn is_consistent(&self) -> bool {
        let mut expected_queues: HashMap<ChannelId, usize> = HashMap::new();
        let mut expected_updaters: HashMap<ChannelId, usize> = HashMap::new();

        for (server_id, channel_id) in &self.server_channels {
            if self.channel_servers.get(channel_id) != Some(server_id) {
                return false;
            }
            *expected_queues.entry(*channel_id).or_default() += 1;
            *expected_updaters.entry(*channel_id).or_default() += 1;
        }
        if self.channel_servers.len() != self.server_channels.len() {
            return false;
        }
        for named in self.named_channels.values() {
            *expected_queues.entry(named.channel_id).or_default() += 1;
        }

        expected_queues.len() == self.queues.len()
            && expected_updaters.len() == self.updaters.len()
            && expected_queues
                .iter()
                .all(|(c, n)| self.queues.usage(c) == *n)
            && expected_updaters
                .iter()
                .all(|(c, n)| self.updaters.usage(c) == *n)
    }
}
