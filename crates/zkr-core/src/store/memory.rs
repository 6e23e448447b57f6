use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    domain::{ChannelId, GuildId, MessageId},
    model::{ChannelLink, GuildKey, MessageLink, TranslateChannel},
    store::{ChannelLinkStore, GuildKeyStore, MessageLinkStore, TranslateChannelStore},
    Result,
};

/// In-memory store backed by `HashMap`s. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryStore {
    translate_channels: Mutex<HashMap<ChannelId, TranslateChannel>>,
    channel_links: Mutex<HashMap<ChannelId, ChannelLink>>,
    message_links: Mutex<MessageLinks>,
    guild_keys: Mutex<HashMap<GuildId, GuildKey>>,
}

#[derive(Default)]
struct MessageLinks {
    by_origin: HashMap<MessageId, MessageLink>,
    // participant message id -> origin message id
    participants: HashMap<MessageId, MessageId>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranslateChannelStore for InMemoryStore {
    async fn get_translate_channel(&self, id: ChannelId) -> Result<Option<TranslateChannel>> {
        let map = self
            .translate_channels
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        Ok(map.get(&id).cloned())
    }

    async fn upsert_translate_channel(&self, channel: &TranslateChannel) -> Result<()> {
        let mut map = self
            .translate_channels
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        map.insert(channel.id, channel.clone());
        Ok(())
    }

    async fn delete_translate_channel(&self, id: ChannelId) -> Result<bool> {
        let mut map = self
            .translate_channels
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        Ok(map.remove(&id).is_some())
    }

    async fn list_translate_channels(&self, guild_id: GuildId) -> Result<Vec<TranslateChannel>> {
        let map = self
            .translate_channels
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<_> = map
            .values()
            .filter(|c| c.guild_id == guild_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.id);
        Ok(out)
    }
}

#[async_trait]
impl ChannelLinkStore for InMemoryStore {
    async fn get_channel_link(&self, id: ChannelId) -> Result<Option<ChannelLink>> {
        let map = self.channel_links.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(&id).cloned())
    }

    async fn upsert_channel_link(&self, link: &ChannelLink) -> Result<()> {
        let mut map = self.channel_links.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(link.id, link.clone());
        Ok(())
    }

    async fn delete_channel_link(&self, id: ChannelId) -> Result<bool> {
        let mut map = self.channel_links.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map.remove(&id).is_some())
    }

    async fn list_channel_links(&self, guild_id: GuildId) -> Result<Vec<ChannelLink>> {
        let map = self.channel_links.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<_> = map
            .values()
            .filter(|l| l.guild_id == guild_id)
            .cloned()
            .collect();
        out.sort_by_key(|l| l.id);
        Ok(out)
    }
}

#[async_trait]
impl MessageLinkStore for InMemoryStore {
    async fn insert_message_link(&self, link: &MessageLink) -> Result<bool> {
        let mut state = self.message_links.lock().unwrap_or_else(|e| e.into_inner());
        if state.by_origin.contains_key(&link.message_id) {
            return Ok(false);
        }
        for item in &link.links {
            state.participants.insert(item.message_id, link.message_id);
        }
        state.by_origin.insert(link.message_id, link.clone());
        Ok(true)
    }

    async fn find_message_link_by_origin(&self, origin: MessageId) -> Result<Option<MessageLink>> {
        let state = self.message_links.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.by_origin.get(&origin).cloned())
    }

    async fn find_message_link_by_participant(
        &self,
        message_id: MessageId,
    ) -> Result<Option<MessageLink>> {
        let state = self.message_links.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state
            .participants
            .get(&message_id)
            .and_then(|origin| state.by_origin.get(origin))
            .cloned())
    }

    async fn delete_message_link(&self, origin: MessageId) -> Result<bool> {
        let mut state = self.message_links.lock().unwrap_or_else(|e| e.into_inner());
        let Some(link) = state.by_origin.remove(&origin) else {
            return Ok(false);
        };
        for item in &link.links {
            state.participants.remove(&item.message_id);
        }
        Ok(true)
    }
}

#[async_trait]
impl GuildKeyStore for InMemoryStore {
    async fn get_guild_key(&self, id: GuildId) -> Result<Option<GuildKey>> {
        let map = self.guild_keys.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(&id).cloned())
    }

    async fn upsert_guild_key(&self, key: &GuildKey) -> Result<()> {
        let mut map = self.guild_keys.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(key.id, key.clone());
        Ok(())
    }

    async fn delete_guild_key(&self, id: GuildId) -> Result<bool> {
        let mut map = self.guild_keys.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map.remove(&id).is_some())
    }
}
