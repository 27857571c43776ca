//! SQLite mapping store.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serenity::async_trait;
use serenity::model::id::ChannelId;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{info, warn};

use super::{MappingStore, StoredMappings};
use crate::common::error::{StoreError, StoreResult};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS server_channels (
        server_id TEXT PRIMARY KEY NOT NULL,
        channel_id INTEGER NOT NULL UNIQUE,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS named_channels (
        name TEXT PRIMARY KEY NOT NULL COLLATE NOCASE,
        channel_id INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
];

/// Mapping store backed by a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connection acquire timeout.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Open (and create if needed) the database at `path`.
    ///
    /// `:memory:` opens a private in-memory database.
    pub async fn open(path: &str) -> StoreResult<Self> {
        let pool = if path == ":memory:" {
            // Unique name per call so parallel tests don't share a database
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:fleetcord-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );
            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        warn!(path = %parent.display(), "Failed to create database directory: {}", e);
                    }
                }
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(4)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await?
        };

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!(path = %path, "Mapping database ready");
        Ok(Self { pool })
    }
}

fn to_db_id(channel_id: ChannelId) -> i64 {
    channel_id.get() as i64
}

fn from_db_id(table: &'static str, raw: i64) -> StoreResult<ChannelId> {
    if raw <= 0 {
        return Err(StoreError::CorruptRow {
            table,
            message: format!("invalid channel id {}", raw),
        });
    }
    Ok(ChannelId::new(raw as u64))
}

#[async_trait]
impl MappingStore for SqliteStore {
    async fn load(&self) -> StoreResult<StoredMappings> {
        let server_rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT server_id, channel_id FROM server_channels ORDER BY server_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let named_rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT name, channel_id FROM named_channels ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let servers = server_rows
            .into_iter()
            .map(|(server_id, raw)| Ok((server_id, from_db_id("server_channels", raw)?)))
            .collect::<StoreResult<Vec<_>>>()?;
        let named = named_rows
            .into_iter()
            .map(|(name, raw)| Ok((name, from_db_id("named_channels", raw)?)))
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(StoredMappings { servers, named })
    }

    async fn replace_server_mapping(
        &self,
        server_id: &str,
        channel_id: ChannelId,
    ) -> StoreResult<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM server_channels WHERE server_id = ? OR channel_id = ?")
            .bind(server_id)
            .bind(to_db_id(channel_id))
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO server_channels (server_id, channel_id, updated_at) VALUES (?, ?, ?)",
        )
        .bind(server_id)
        .bind(to_db_id(channel_id))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove_server_mapping(&self, channel_id: ChannelId) -> StoreResult<()> {
        sqlx::query("DELETE FROM server_channels WHERE channel_id = ?")
            .bind(to_db_id(channel_id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn replace_named_mapping(&self, name: &str, channel_id: ChannelId) -> StoreResult<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM named_channels WHERE name = ? COLLATE NOCASE")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO named_channels (name, channel_id, updated_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(to_db_id(channel_id))
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove_named_mapping(&self, name: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM named_channels WHERE name = ? COLLATE NOCASE")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_database_loads_nothing() {
        let store = SqliteStore::open(":memory:").await.unwrap();
        assert_eq!(store.load().await.unwrap(), StoredMappings::default());
    }

    #[tokio::test]
    async fn test_server_mapping_replaces_both_sides() {
        let store = SqliteStore::open(":memory:").await.unwrap();
        store.replace_server_mapping("a", ChannelId::new(1)).await.unwrap();
        store.replace_server_mapping("b", ChannelId::new(2)).await.unwrap();

        // "a" moves to channel 2, which also evicts "b"
        store.replace_server_mapping("a", ChannelId::new(2)).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.servers, vec![("a".to_string(), ChannelId::new(2))]);
    }

    #[tokio::test]
    async fn test_remove_server_mapping() {
        let store = SqliteStore::open(":memory:").await.unwrap();
        store.replace_server_mapping("a", ChannelId::new(1)).await.unwrap();
        store.remove_server_mapping(ChannelId::new(1)).await.unwrap();
        store.remove_server_mapping(ChannelId::new(1)).await.unwrap();

        assert!(store.load().await.unwrap().servers.is_empty());
    }

    #[tokio::test]
    async fn test_named_mapping_is_case_insensitive() {
        let store = SqliteStore::open(":memory:").await.unwrap();
        store.replace_named_mapping("Events", ChannelId::new(1)).await.unwrap();
        store.replace_named_mapping("events", ChannelId::new(2)).await.unwrap();
        store.replace_named_mapping("log", ChannelId::new(2)).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(
            loaded.named,
            vec![
                ("events".to_string(), ChannelId::new(2)),
                ("log".to_string(), ChannelId::new(2)),
            ]
        );

        store.remove_named_mapping("EVENTS").await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.named, vec![("log".to_string(), ChannelId::new(2))]);
    }

    #[tokio::test]
    async fn test_in_memory_databases_are_isolated() {
        let first = SqliteStore::open(":memory:").await.unwrap();
        let second = SqliteStore::open(":memory:").await.unwrap();
        first.replace_server_mapping("a", ChannelId::new(1)).await.unwrap();

        assert!(second.load().await.unwrap().servers.is_empty());
    }
}
