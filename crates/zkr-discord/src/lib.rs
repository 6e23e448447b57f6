//! Discord adapter (serenity).
//!
//! This crate implements the `zkr-core` RelayPort over the Discord HTTP API and
//! feeds gateway events into the core sync handlers and command service.

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use async_trait::async_trait;

use serenity::{
    all::{
        Cache, ChannelType, CreateAllowedMentions, CreateAttachment, CreateEmbed,
        CreateEmbedAuthor, CreateMessage, CreateWebhook, EditWebhookMessage, EmojiId,
        ExecuteWebhook, GetMessages, Http, Message, ReactionType, Webhook,
    },
    http::HttpError,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub mod handlers;
pub mod router;

use zkr_core::{
    domain::{ChannelId, MessageId, MessageRef, UserId},
    errors::Error,
    relay::{
        Author, Embed, FetchedMessage, OutgoingMessage, ReactionEmoji, RelayLimits, RelayPort,
        EMBED_COLOR,
    },
    Result,
};

/// Relays through one bot-owned webhook per channel.
pub struct DiscordRelay {
    http: Arc<Http>,
    cache: OnceLock<Arc<Cache>>,
    bot_id: UserId,
    webhook_name: String,
    limits: RelayLimits,
    webhooks: Mutex<HashMap<ChannelId, Webhook>>,
}

impl DiscordRelay {
    pub fn new(http: Arc<Http>, bot_id: UserId, webhook_name: String, limits: RelayLimits) -> Self {
        Self {
            http,
            cache: OnceLock::new(),
            bot_id,
            webhook_name,
            limits,
            webhooks: Mutex::new(HashMap::new()),
        }
    }

    /// The gateway cache only exists once the client is running.
    pub fn attach_cache(&self, cache: Arc<Cache>) {
        let _ = self.cache.set(cache);
    }

    fn dc_channel(channel: ChannelId) -> serenity::all::ChannelId {
        serenity::all::ChannelId::new(channel.0)
    }

    fn dc_msg_id(message_id: MessageId) -> serenity::all::MessageId {
        serenity::all::MessageId::new(message_id.0)
    }

    fn map_err(channel: ChannelId, e: serenity::Error) -> Error {
        if is_unknown_resource(&e) {
            return Error::NotFound(format!("discord resource in channel {channel}: {e}"));
        }
        Error::Dispatch {
            channel: channel.0,
            reason: e.to_string(),
        }
    }

    fn is_owned(&self, webhook: &Webhook) -> bool {
        webhook.token.is_some() && webhook.user.as_ref().map(|u| u.id.get()) == Some(self.bot_id.0)
    }

    /// The channel's relay webhook, created on first use.
    ///
    /// The map lock is only held for lookups; concurrent first sends may both
    /// resolve a webhook, and the first one stored wins.
    async fn webhook(&self, channel: ChannelId) -> Result<Webhook> {
        if let Some(hook) = self.webhooks.lock().await.get(&channel) {
            return Ok(hook.clone());
        }

        let existing = Self::dc_channel(channel)
            .webhooks(&self.http)
            .await
            .map_err(|e| Self::map_err(channel, e))?;
        let hook = match existing.into_iter().find(|w| self.is_owned(w)) {
            Some(hook) => hook,
            None => {
                let hook = Self::dc_channel(channel)
                    .create_webhook(&self.http, CreateWebhook::new(self.webhook_name.as_str()))
                    .await
                    .map_err(|e| Self::map_err(channel, e))?;
                info!(channel_id = %channel, webhook_id = %hook.id, "relay webhook created");
                hook
            }
        };
        Ok(remember_webhook(&mut *self.webhooks.lock().await, channel, hook))
    }

    /// Whether `webhook_id` is the relay webhook of `channel`.
    pub async fn is_own_webhook(&self, channel: ChannelId, webhook_id: u64) -> bool {
        {
            let cache = self.webhooks.lock().await;
            if let Some(hook) = cache.get(&channel) {
                return hook.id.get() == webhook_id;
            }
        }
        match self.http.get_webhook(serenity::all::WebhookId::new(webhook_id)).await {
            Ok(hook) => hook.user.as_ref().map(|u| u.id.get()) == Some(self.bot_id.0),
            Err(e) => {
                debug!(channel_id = %channel, webhook_id, error = %e, "webhook lookup failed");
                false
            }
        }
    }

    async fn attachment_files(&self, message: &OutgoingMessage) -> Vec<CreateAttachment> {
        let mut files = Vec::with_capacity(message.attachments.len());
        for attachment in &message.attachments {
            match CreateAttachment::url(&self.http, &attachment.url).await {
                Ok(file) => files.push(file),
                Err(e) => warn!(url = %attachment.url, error = %e, "attachment download failed"),
            }
        }
        files
    }
}

/// Stores `hook` unless another task already stored one for `channel`.
fn remember_webhook(
    webhooks: &mut HashMap<ChannelId, Webhook>,
    channel: ChannelId,
    hook: Webhook,
) -> Webhook {
    webhooks.entry(channel).or_insert(hook).clone()
}

fn is_unknown_resource(e: &serenity::Error) -> bool {
    matches!(
        e,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) if resp.status_code.as_u16() == 404
    )
}

pub(crate) fn build_embed(embed: &Embed) -> CreateEmbed {
    let mut author = CreateEmbedAuthor::new(embed.author_name.as_str());
    if let Some(icon) = &embed.author_icon_url {
        author = author.icon_url(icon.as_str());
    }
    CreateEmbed::new()
        .color(EMBED_COLOR)
        .author(author)
        .description(embed.description.as_str())
}

pub(crate) fn to_reaction_type(emoji: &ReactionEmoji) -> ReactionType {
    match emoji {
        ReactionEmoji::Unicode(s) => ReactionType::Unicode(s.clone()),
        ReactionEmoji::Custom { id, name, animated } => ReactionType::Custom {
            animated: *animated,
            id: EmojiId::new(*id),
            name: name.clone(),
        },
    }
}

pub(crate) fn from_reaction_type(emoji: &ReactionType) -> Option<ReactionEmoji> {
    match emoji {
        ReactionType::Unicode(s) => Some(ReactionEmoji::Unicode(s.clone())),
        ReactionType::Custom { animated, id, name } => Some(ReactionEmoji::Custom {
            id: id.get(),
            name: name.clone(),
            animated: *animated,
        }),
        _ => None,
    }
}

/// How a user is shown: server nickname, then global name, then username.
pub(crate) fn author_of(msg: &Message) -> Author {
    let nick = msg.member.as_ref().and_then(|m| m.nick.clone());
    Author {
        id: UserId(msg.author.id.get()),
        display_name: nick
            .or_else(|| msg.author.global_name.clone())
            .unwrap_or_else(|| msg.author.name.clone()),
        avatar_url: Some(msg.author.face()),
        is_bot: msg.author.bot,
    }
}

fn to_fetched(message: MessageRef, found: &Message) -> FetchedMessage {
    FetchedMessage {
        message,
        url: found.link(),
        content: found.content.clone(),
        author: author_of(found),
        is_relay: found.webhook_id.is_some(),
        has_attachments: !found.attachments.is_empty(),
        has_stickers: !found.sticker_items.is_empty(),
    }
}

#[async_trait]
impl RelayPort for DiscordRelay {
    fn limits(&self) -> RelayLimits {
        self.limits
    }

    fn current_user_id(&self) -> UserId {
        self.bot_id
    }

    fn has_emoji(&self, emoji_id: u64) -> bool {
        let Some(cache) = self.cache.get() else {
            return false;
        };
        let id = EmojiId::new(emoji_id);
        cache.guilds().into_iter().any(|guild_id| {
            cache
                .guild(guild_id)
                .is_some_and(|guild| guild.emojis.contains_key(&id))
        })
    }

    async fn is_text_channel(&self, channel: ChannelId) -> Result<bool> {
        if let Some(cache) = self.cache.get() {
            if let Some(cached) = cache.channel(Self::dc_channel(channel)) {
                return Ok(matches!(cached.kind, ChannelType::Text));
            }
        }
        let found = self
            .http
            .get_channel(Self::dc_channel(channel))
            .await
            .map_err(|e| Self::map_err(channel, e))?;
        Ok(found
            .guild()
            .is_some_and(|c| matches!(c.kind, ChannelType::Text)))
    }

    async fn send_as(&self, channel: ChannelId, message: OutgoingMessage) -> Result<MessageRef> {
        let hook = self.webhook(channel).await?;

        let mut builder = ExecuteWebhook::new()
            .username(message.username.as_str())
            .embeds(message.embeds.iter().map(build_embed).collect())
            .allowed_mentions(CreateAllowedMentions::new().all_users(true).all_roles(false));
        if let Some(avatar) = &message.avatar_url {
            builder = builder.avatar_url(avatar.as_str());
        }
        if let Some(content) = message.content.as_deref().filter(|c| !c.is_empty()) {
            builder = builder.content(content);
        }
        for file in self.attachment_files(&message).await {
            builder = builder.add_file(file);
        }

        let sent = hook
            .execute(&self.http, true, builder)
            .await
            .map_err(|e| Self::map_err(channel, e))?
            .ok_or_else(|| Error::Dispatch {
                channel: channel.0,
                reason: "webhook returned no message".to_string(),
            })?;
        Ok(MessageRef::new(channel, MessageId(sent.id.get())))
    }

    async fn edit_relayed(&self, message: MessageRef, content: &str) -> Result<()> {
        let hook = self.webhook(message.channel_id).await?;
        hook.edit_message(
            &self.http,
            Self::dc_msg_id(message.message_id),
            EditWebhookMessage::new().content(content),
        )
        .await
        .map_err(|e| Self::map_err(message.channel_id, e))?;
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> Result<()> {
        Self::dc_channel(message.channel_id)
            .delete_message(&self.http, Self::dc_msg_id(message.message_id))
            .await
            .map_err(|e| Self::map_err(message.channel_id, e))
    }

    async fn add_reaction(&self, message: MessageRef, emoji: &ReactionEmoji) -> Result<()> {
        Self::dc_channel(message.channel_id)
            .create_reaction(
                &self.http,
                Self::dc_msg_id(message.message_id),
                to_reaction_type(emoji),
            )
            .await
            .map_err(|e| Self::map_err(message.channel_id, e))
    }

    async fn remove_own_reaction(&self, message: MessageRef, emoji: &ReactionEmoji) -> Result<()> {
        Self::dc_channel(message.channel_id)
            .delete_reaction(
                &self.http,
                Self::dc_msg_id(message.message_id),
                None,
                to_reaction_type(emoji),
            )
            .await
            .map_err(|e| Self::map_err(message.channel_id, e))
    }

    async fn fetch_message(&self, message: MessageRef) -> Result<FetchedMessage> {
        let found = Self::dc_channel(message.channel_id)
            .message(&self.http, Self::dc_msg_id(message.message_id))
            .await
            .map_err(|e| Self::map_err(message.channel_id, e))?;
        Ok(to_fetched(message, &found))
    }

    async fn recent_messages(&self, before: MessageRef, limit: usize) -> Result<Vec<FetchedMessage>> {
        let limit = u8::try_from(limit.min(100)).unwrap_or(100);
        let found = Self::dc_channel(before.channel_id)
            .messages(
                &self.http,
                GetMessages::new()
                    .before(Self::dc_msg_id(before.message_id))
                    .limit(limit),
            )
            .await
            .map_err(|e| Self::map_err(before.channel_id, e))?;
        Ok(found
            .iter()
            .map(|m| {
                let message = MessageRef::new(before.channel_id, MessageId(m.id.get()));
                to_fetched(message, m)
            })
            .collect())
    }

    async fn reply(&self, to: MessageRef, content: &str) -> Result<MessageRef> {
        let channel = Self::dc_channel(to.channel_id);
        let sent = channel
            .send_message(
                &self.http,
                CreateMessage::new()
                    .content(content)
                    .reference_message((channel, Self::dc_msg_id(to.message_id))),
            )
            .await
            .map_err(|e| Self::map_err(to.channel_id, e))?;
        Ok(MessageRef::new(to.channel_id, MessageId(sent.id.get())))
    }
}
