use async_trait::async_trait;

use crate::{
    domain::{ChannelId, MessageRef, UserId},
    relay::types::{FetchedMessage, OutgoingMessage, ReactionEmoji, RelayLimits},
    Result,
};

/// Outbound operations the relay needs from the chat platform.
///
/// Discord is the only implementation; the core never sees gateway types.
#[async_trait]
pub trait RelayPort: Send + Sync {
    fn limits(&self) -> RelayLimits;
    fn current_user_id(&self) -> UserId;

    /// Whether the bot can render the custom emoji `emoji_id`.
    fn has_emoji(&self, emoji_id: u64) -> bool;

    async fn is_text_channel(&self, channel: ChannelId) -> Result<bool>;

    /// Posts `message` in `channel` under the message's relay identity.
    async fn send_as(&self, channel: ChannelId, message: OutgoingMessage) -> Result<MessageRef>;
    /// Replaces the content of a message posted with `send_as`.
    async fn edit_relayed(&self, message: MessageRef, content: &str) -> Result<()>;
    async fn delete_message(&self, message: MessageRef) -> Result<()>;

    async fn add_reaction(&self, message: MessageRef, emoji: &ReactionEmoji) -> Result<()>;
    async fn remove_own_reaction(&self, message: MessageRef, emoji: &ReactionEmoji) -> Result<()>;

    async fn fetch_message(&self, message: MessageRef) -> Result<FetchedMessage>;
    /// Up to `limit` messages posted in the same channel before `before`,
    /// newest first.
    async fn recent_messages(&self, before: MessageRef, limit: usize) -> Result<Vec<FetchedMessage>>;
    /// Replies to `to` as the bot itself.
    async fn reply(&self, to: MessageRef, content: &str) -> Result<MessageRef>;
}
