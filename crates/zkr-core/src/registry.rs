use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    domain::{ChannelId, GuildId},
    model::TranslateChannel,
    store::TranslateChannelStore,
    Result,
};

/// Read-through / write-through cache of translate channels.
///
/// Constructed once per process; misses go to the store, every mutation is
/// written to the store before the cache is updated.
pub struct TranslateChannelRegistry {
    store: Arc<dyn TranslateChannelStore>,
    cache: RwLock<HashMap<ChannelId, TranslateChannel>>,
}

impl TranslateChannelRegistry {
    pub fn new(store: Arc<dyn TranslateChannelStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, id: ChannelId) -> Result<Option<TranslateChannel>> {
        if let Some(hit) = self.cache.read().await.get(&id) {
            return Ok(Some(hit.clone()));
        }

        let Some(found) = self.store.get_translate_channel(id).await? else {
            return Ok(None);
        };
        self.cache.write().await.insert(id, found.clone());
        Ok(Some(found))
    }

    /// Creates the channel or changes its language in place.
    pub async fn set(
        &self,
        id: ChannelId,
        guild_id: GuildId,
        language_code: &str,
    ) -> Result<TranslateChannel> {
        let channel = match self.get(id).await? {
            Some(mut existing) => {
                existing.language_code = language_code.to_string();
                existing
            }
            None => TranslateChannel {
                id,
                guild_id,
                language_code: language_code.to_string(),
                created_at: Utc::now(),
            },
        };

        self.store.upsert_translate_channel(&channel).await?;
        self.cache.write().await.insert(id, channel.clone());
        Ok(channel)
    }

    /// Returns whether a channel was removed.
    pub async fn unset(&self, id: ChannelId) -> Result<bool> {
        let removed = self.store.delete_translate_channel(id).await?;
        self.cache.write().await.remove(&id);
        Ok(removed)
    }

    pub async fn list(&self, guild_id: GuildId) -> Result<Vec<TranslateChannel>> {
        self.store.list_translate_channels(guild_id).await
    }

    /// Drops every cached entry.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}
