use crate::domain::{ChannelId, GuildId, MessageId, MessageRef, UserId};

/// Who a message is shown as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_bot: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Regular,
    /// The bot's acknowledgement of a slash command someone ran.
    CommandEcho { command_name: String, invoker: Author },
}

/// A message posted by someone other than the relay webhooks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    pub guild_id: GuildId,
    pub message: MessageRef,
    pub author: Author,
    pub kind: MessageKind,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub sticker_id: Option<u64>,
    pub reply_to: Option<MessageId>,
}

/// An edit to a message the relay may have copied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditedMessage {
    pub guild_id: GuildId,
    pub message: MessageRef,
    pub content: String,
    /// Set for bot and application authors, including command echoes.
    pub author_is_bot: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReactionEmoji {
    Unicode(String),
    Custom {
        id: u64,
        name: Option<String>,
        animated: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionEvent {
    pub message: MessageRef,
    pub user_id: UserId,
    pub emoji: ReactionEmoji,
}

/// Accent colour of relay embeds.
pub const EMBED_COLOR: u32 = 0x0099ff;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Embed {
    pub author_name: String,
    pub author_icon_url: Option<String>,
    pub description: String,
}

/// A message posted under a relay identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub username: String,
    pub avatar_url: Option<String>,
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    pub attachments: Vec<Attachment>,
}

impl OutgoingMessage {
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().map_or(true, str::is_empty)
            && self.embeds.is_empty()
            && self.attachments.is_empty()
    }
}

/// A message read back from the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedMessage {
    pub message: MessageRef,
    pub url: String,
    pub content: String,
    pub author: Author,
    /// Posted by a webhook rather than a user.
    pub is_relay: bool,
    pub has_attachments: bool,
    pub has_stickers: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayLimits {
    pub message_chars: usize,
    pub attachment_bytes: u64,
}
