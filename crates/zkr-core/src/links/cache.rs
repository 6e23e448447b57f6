use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::{
    domain::{ChannelId, GuildId},
    model::ChannelLink,
    store::ChannelLinkStore,
    Result,
};

/// Read-through / write-through cache of channel links.
pub struct ChannelLinkCache {
    store: Arc<dyn ChannelLinkStore>,
    cache: RwLock<HashMap<ChannelId, ChannelLink>>,
}

impl ChannelLinkCache {
    pub fn new(store: Arc<dyn ChannelLinkStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, id: ChannelId) -> Result<Option<ChannelLink>> {
        if let Some(hit) = self.cache.read().await.get(&id) {
            return Ok(Some(hit.clone()));
        }

        let Some(found) = self.store.get_channel_link(id).await? else {
            return Ok(None);
        };
        self.cache.write().await.insert(id, found.clone());
        Ok(Some(found))
    }

    pub async fn list(&self, guild_id: GuildId) -> Result<Vec<ChannelLink>> {
        self.store.list_channel_links(guild_id).await
    }

    /// Persists `link`, or deletes it once it has no edges left.
    pub(crate) async fn save(&self, link: &ChannelLink) -> Result<()> {
        if link.is_empty() {
            self.delete(link.id).await?;
            return Ok(());
        }
        self.store.upsert_channel_link(link).await?;
        self.cache.write().await.insert(link.id, link.clone());
        Ok(())
    }

    pub(crate) async fn delete(&self, id: ChannelId) -> Result<bool> {
        let removed = self.store.delete_channel_link(id).await?;
        self.cache.write().await.remove(&id);
        Ok(removed)
    }

    /// Drops every cached entry.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}
