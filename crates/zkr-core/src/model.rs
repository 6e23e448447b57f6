//! Persisted document records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChannelId, GuildId, MessageId, MessageRef, UserId},
    translation::ProviderKind,
};

/// A channel opted into translation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslateChannel {
    pub id: ChannelId,
    pub guild_id: GuildId,
    pub language_code: String,
    pub created_at: DateTime<Utc>,
}

/// One node's adjacency list in the link graph.
///
/// `links` holds channel ids in link order, never the node's own id and never
/// the same id twice. A record with no links is never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLink {
    pub id: ChannelId,
    pub guild_id: GuildId,
    pub links: Vec<ChannelId>,
    pub created_at: DateTime<Utc>,
}

impl ChannelLink {
    pub fn new(id: ChannelId, guild_id: GuildId) -> Self {
        Self {
            id,
            guild_id,
            links: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn contains(&self, channel: ChannelId) -> bool {
        self.links.contains(&channel)
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLinkItem {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
}

impl From<MessageRef> for MessageLinkItem {
    fn from(r: MessageRef) -> Self {
        Self {
            message_id: r.message_id,
            channel_id: r.channel_id,
        }
    }
}

impl From<MessageLinkItem> for MessageRef {
    fn from(item: MessageLinkItem) -> Self {
        MessageRef::new(item.channel_id, item.message_id)
    }
}

/// One authored message and every relayed copy of it.
///
/// `links` starts with the origin pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLink {
    pub author_id: UserId,
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub links: Vec<MessageLinkItem>,
    pub created_at: DateTime<Utc>,
}

impl MessageLink {
    pub fn origin(&self) -> MessageRef {
        MessageRef::new(self.channel_id, self.message_id)
    }

    pub fn contains(&self, message_id: MessageId) -> bool {
        self.links.iter().any(|l| l.message_id == message_id)
    }

    /// The participant (origin or copy) living in `channel`.
    pub fn in_channel(&self, channel: ChannelId) -> Option<MessageRef> {
        self.links
            .iter()
            .find(|l| l.channel_id == channel)
            .map(|l| MessageRef::from(*l))
    }

    /// Every participant except `message_id`.
    pub fn others(&self, message_id: MessageId) -> Vec<MessageRef> {
        self.links
            .iter()
            .filter(|l| l.message_id != message_id)
            .map(|l| MessageRef::from(*l))
            .collect()
    }
}

/// An encrypted provider credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredKey {
    pub kind: ProviderKind,
    pub ciphertext: String,
}

/// Translation credentials of one guild.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildKey {
    pub id: GuildId,
    pub preferred: Option<ProviderKind>,
    pub keys: Vec<StoredKey>,
    pub created_at: DateTime<Utc>,
}
