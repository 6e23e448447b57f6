//! SQLite persistence for the relay bot.
//!
//! Each document is stored as JSON next to the columns it is looked up by.
//! Discord snowflakes fit in 63 bits, so ids are stored as `INTEGER`.

use std::str::FromStr;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;
use zkr_core::{
    domain::{ChannelId, GuildId, MessageId},
    errors::Error,
    model::{ChannelLink, GuildKey, MessageLink, TranslateChannel},
    store::{ChannelLinkStore, GuildKeyStore, MessageLinkStore, TranslateChannelStore},
    Result,
};

fn db(e: sqlx::Error) -> Error {
    Error::Store(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn decode<T: DeserializeOwned>(data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| Error::Store(format!("corrupt row: {e}")))
}

fn sql_id(id: u64) -> i64 {
    id as i64
}

/// Implements every store port over one connection pool.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db)?
            .create_if_missing(true)
            .foreign_keys(true);
        // Every in-memory connection is its own database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(db)?;
        let store = Self::new(pool);
        store.migrate().await?;
        info!(url, "sqlite store ready");
        Ok(store)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Store(format!("migration failed: {e}")))
    }

    async fn fetch_data<T: DeserializeOwned>(&self, sql: &str, id: u64) -> Result<Option<T>> {
        let row: Option<String> = sqlx::query_scalar(sql)
            .bind(sql_id(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        row.as_deref().map(decode).transpose()
    }

    async fn fetch_all_data<T: DeserializeOwned>(&self, sql: &str, id: u64) -> Result<Vec<T>> {
        let rows: Vec<String> = sqlx::query_scalar(sql)
            .bind(sql_id(id))
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        rows.iter().map(|r| decode(r)).collect()
    }

    async fn delete_by_id(&self, sql: &str, id: u64) -> Result<bool> {
        let done = sqlx::query(sql)
            .bind(sql_id(id))
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(done.rows_affected() > 0)
    }
}

#[async_trait]
impl TranslateChannelStore for SqliteStore {
    async fn get_translate_channel(&self, id: ChannelId) -> Result<Option<TranslateChannel>> {
        self.fetch_data("SELECT data FROM translate_channels WHERE id = ?", id.0)
            .await
    }

    async fn upsert_translate_channel(&self, channel: &TranslateChannel) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO translate_channels (id, guild_id, data) VALUES (?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET guild_id = excluded.guild_id, data = excluded.data"#,
        )
        .bind(sql_id(channel.id.0))
        .bind(sql_id(channel.guild_id.0))
        .bind(encode(channel)?)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn delete_translate_channel(&self, id: ChannelId) -> Result<bool> {
        self.delete_by_id("DELETE FROM translate_channels WHERE id = ?", id.0)
            .await
    }

    async fn list_translate_channels(&self, guild_id: GuildId) -> Result<Vec<TranslateChannel>> {
        self.fetch_all_data(
            "SELECT data FROM translate_channels WHERE guild_id = ? ORDER BY id",
            guild_id.0,
        )
        .await
    }
}

#[async_trait]
impl ChannelLinkStore for SqliteStore {
    async fn get_channel_link(&self, id: ChannelId) -> Result<Option<ChannelLink>> {
        self.fetch_data("SELECT data FROM channel_links WHERE id = ?", id.0)
            .await
    }

    async fn upsert_channel_link(&self, link: &ChannelLink) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO channel_links (id, guild_id, data) VALUES (?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET guild_id = excluded.guild_id, data = excluded.data"#,
        )
        .bind(sql_id(link.id.0))
        .bind(sql_id(link.guild_id.0))
        .bind(encode(link)?)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn delete_channel_link(&self, id: ChannelId) -> Result<bool> {
        self.delete_by_id("DELETE FROM channel_links WHERE id = ?", id.0)
            .await
    }

    async fn list_channel_links(&self, guild_id: GuildId) -> Result<Vec<ChannelLink>> {
        self.fetch_all_data(
            "SELECT data FROM channel_links WHERE guild_id = ? ORDER BY id",
            guild_id.0,
        )
        .await
    }
}

#[async_trait]
impl MessageLinkStore for SqliteStore {
    async fn insert_message_link(&self, link: &MessageLink) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let inserted = sqlx::query("INSERT OR IGNORE INTO message_links (origin_id, data) VALUES (?, ?)")
            .bind(sql_id(link.message_id.0))
            .bind(encode(link)?)
            .execute(&mut *tx)
            .await
            .map_err(db)?
            .rows_affected()
            > 0;
        if !inserted {
            return Ok(false);
        }
        for item in &link.links {
            sqlx::query("INSERT OR REPLACE INTO message_link_items (message_id, origin_id) VALUES (?, ?)")
                .bind(sql_id(item.message_id.0))
                .bind(sql_id(link.message_id.0))
                .execute(&mut *tx)
                .await
                .map_err(db)?;
        }
        tx.commit().await.map_err(db)?;
        Ok(true)
    }

    async fn find_message_link_by_origin(&self, origin: MessageId) -> Result<Option<MessageLink>> {
        self.fetch_data("SELECT data FROM message_links WHERE origin_id = ?", origin.0)
            .await
    }

    async fn find_message_link_by_participant(
        &self,
        message_id: MessageId,
    ) -> Result<Option<MessageLink>> {
        self.fetch_data(
            r#"SELECT m.data FROM message_link_items i
               JOIN message_links m ON m.origin_id = i.origin_id
               WHERE i.message_id = ?"#,
            message_id.0,
        )
        .await
    }

    async fn delete_message_link(&self, origin: MessageId) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        sqlx::query("DELETE FROM message_link_items WHERE origin_id = ?")
            .bind(sql_id(origin.0))
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        let removed = sqlx::query("DELETE FROM message_links WHERE origin_id = ?")
            .bind(sql_id(origin.0))
            .execute(&mut *tx)
            .await
            .map_err(db)?
            .rows_affected()
            > 0;
        tx.commit().await.map_err(db)?;
        Ok(removed)
    }
}

#[async_trait]
impl GuildKeyStore for SqliteStore {
    async fn get_guild_key(&self, id: GuildId) -> Result<Option<GuildKey>> {
        self.fetch_data("SELECT data FROM guild_keys WHERE id = ?", id.0)
            .await
    }

    async fn upsert_guild_key(&self, key: &GuildKey) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO guild_keys (id, data) VALUES (?, ?)
               ON CONFLICT(id) DO UPDATE SET data = excluded.data"#,
        )
        .bind(sql_id(key.id.0))
        .bind(encode(key)?)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn delete_guild_key(&self, id: GuildId) -> Result<bool> {
        self.delete_by_id("DELETE FROM guild_keys WHERE id = ?", id.0)
            .await
    }
}
