//! Persistent storage of channel mappings.
//!
//! Two tables: server ↔ channel (bijective) and name → channel. The
//! coordinator writes them on every mutation and reads them once at startup.

mod sqlite;

pub use sqlite::SqliteStore;

use serenity::async_trait;
use serenity::model::id::ChannelId;

use crate::common::error::StoreResult;

/// All persisted mappings, as loaded at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredMappings {
    /// `(server_id, channel_id)` rows.
    pub servers: Vec<(String, ChannelId)>,
    /// `(name, channel_id)` rows.
    pub named: Vec<(String, ChannelId)>,
}

/// Storage backend for channel mappings.
///
/// Every write is atomic: conflicting rows are removed in the same
/// transaction that inserts the new one.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn load(&self) -> StoreResult<StoredMappings>;

    /// Insert `(server_id, channel_id)`, replacing rows that share either side.
    async fn replace_server_mapping(&self, server_id: &str, channel_id: ChannelId)
        -> StoreResult<()>;

    /// Remove the row for `channel_id`, if any.
    async fn remove_server_mapping(&self, channel_id: ChannelId) -> StoreResult<()>;

    /// Insert `(name, channel_id)`, replacing the row with the same name.
    async fn replace_named_mapping(&self, name: &str, channel_id: ChannelId) -> StoreResult<()>;

    /// Remove the row for `name`, if any.
    async fn remove_named_mapping(&self, name: &str) -> StoreResult<()>;
}
