//! Persistence ports for the four document kinds.
//!
//! One backend type implements every trait; the registry, link cache, ledger
//! and translator cache each hold the narrow trait they need.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;

use crate::{
    domain::{ChannelId, GuildId, MessageId},
    model::{ChannelLink, GuildKey, MessageLink, TranslateChannel},
    Result,
};

#[async_trait]
pub trait TranslateChannelStore: Send + Sync {
    async fn get_translate_channel(&self, id: ChannelId) -> Result<Option<TranslateChannel>>;
    async fn upsert_translate_channel(&self, channel: &TranslateChannel) -> Result<()>;
    /// Returns whether a record was removed.
    async fn delete_translate_channel(&self, id: ChannelId) -> Result<bool>;
    async fn list_translate_channels(&self, guild_id: GuildId) -> Result<Vec<TranslateChannel>>;
}

#[async_trait]
pub trait ChannelLinkStore: Send + Sync {
    async fn get_channel_link(&self, id: ChannelId) -> Result<Option<ChannelLink>>;
    async fn upsert_channel_link(&self, link: &ChannelLink) -> Result<()>;
    async fn delete_channel_link(&self, id: ChannelId) -> Result<bool>;
    async fn list_channel_links(&self, guild_id: GuildId) -> Result<Vec<ChannelLink>>;
}

#[async_trait]
pub trait MessageLinkStore: Send + Sync {
    /// Inserts the entry unless one already exists for the same origin.
    /// Returns whether it was inserted.
    async fn insert_message_link(&self, link: &MessageLink) -> Result<bool>;
    async fn find_message_link_by_origin(&self, origin: MessageId) -> Result<Option<MessageLink>>;
    /// Finds the entry that lists `message_id` as origin or copy.
    async fn find_message_link_by_participant(
        &self,
        message_id: MessageId,
    ) -> Result<Option<MessageLink>>;
    async fn delete_message_link(&self, origin: MessageId) -> Result<bool>;
}

#[async_trait]
pub trait GuildKeyStore: Send + Sync {
    async fn get_guild_key(&self, id: GuildId) -> Result<Option<GuildKey>>;
    async fn upsert_guild_key(&self, key: &GuildKey) -> Result<()>;
    async fn delete_guild_key(&self, id: GuildId) -> Result<bool>;
}

/// Every store port at once.
pub trait Store: TranslateChannelStore + ChannelLinkStore + MessageLinkStore + GuildKeyStore {}

impl<T> Store for T where T: TranslateChannelStore + ChannelLinkStore + MessageLinkStore + GuildKeyStore
{}
