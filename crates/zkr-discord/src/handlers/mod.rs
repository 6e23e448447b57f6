//! Gateway event handlers.
//!
//! Each handler converts the serenity event into a core type and hands it to
//! the relay pipeline, the sync handlers or the command service. Failures are
//! logged; nothing here surfaces to users except command replies.

use std::sync::Arc;

use serenity::{
    all::{
        ChannelId as DcChannelId, Command, Context, EventHandler, GatewayIntents, GuildId as DcGuildId,
        Interaction, Message, MessageId as DcMessageId, MessageUpdateEvent, Reaction, Ready,
    },
    async_trait,
};
use tracing::{debug, info, warn};

use zkr_core::{
    domain::{ChannelId, GuildId, MessageId, MessageRef, UserId},
    relay::{Attachment, Author, EditedMessage, IncomingMessage, MessageKind, ReactionEvent},
};

use crate::{author_of, from_reaction_type, router::AppState};

mod commands;

pub struct Handler {
    state: Arc<AppState>,
}

impl Handler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILD_MESSAGE_REACTIONS
            | GatewayIntents::GUILD_EMOJIS_AND_STICKERS
    }
}

#[allow(deprecated)]
fn to_incoming(msg: &Message) -> Option<IncomingMessage> {
    let guild_id = msg.guild_id?;
    let kind = match &msg.interaction {
        Some(interaction) => MessageKind::CommandEcho {
            command_name: interaction.name.clone(),
            invoker: Author {
                id: UserId(interaction.user.id.get()),
                display_name: interaction
                    .user
                    .global_name
                    .clone()
                    .unwrap_or_else(|| interaction.user.name.clone()),
                avatar_url: Some(interaction.user.face()),
                is_bot: interaction.user.bot,
            },
        },
        None => MessageKind::Regular,
    };

    Some(IncomingMessage {
        guild_id: GuildId(guild_id.get()),
        message: message_ref(msg.channel_id, msg.id),
        author: author_of(msg),
        kind,
        content: msg.content.clone(),
        attachments: msg
            .attachments
            .iter()
            .map(|a| Attachment {
                url: a.url.clone(),
                filename: a.filename.clone(),
                size: u64::from(a.size),
            })
            .collect(),
        sticker_id: msg.sticker_items.first().map(|s| s.id.get()),
        reply_to: msg
            .message_reference
            .as_ref()
            .and_then(|r| r.message_id)
            .map(|id| MessageId(id.get())),
    })
}

fn message_ref(channel: DcChannelId, message: DcMessageId) -> MessageRef {
    MessageRef::new(ChannelId(channel.get()), MessageId(message.get()))
}

fn to_reaction_event(reaction: &Reaction) -> Option<ReactionEvent> {
    Some(ReactionEvent {
        message: message_ref(reaction.channel_id, reaction.message_id),
        user_id: UserId(reaction.user_id?.get()),
        emoji: from_reaction_type(&reaction.emoji)?,
    })
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(
            bot_name = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord bot ready"
        );
        self.state.relay.attach_cache(ctx.cache.clone());

        match Command::set_global_commands(&ctx.http, commands::definitions()).await {
            Ok(registered) => info!(count = registered.len(), "slash commands registered"),
            Err(e) => warn!(error = %e, "slash command registration failed"),
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        let channel = ChannelId(msg.channel_id.get());
        if let Some(webhook_id) = msg.webhook_id {
            if self.state.relay.is_own_webhook(channel, webhook_id.get()).await {
                return;
            }
        }
        let Some(incoming) = to_incoming(&msg) else {
            return;
        };

        match self.state.services.pipeline.handle(&incoming).await {
            Ok(Some(entry)) => debug!(
                message_id = %incoming.message.message_id,
                copies = entry.links.len().saturating_sub(1),
                "message relayed"
            ),
            Ok(None) => {}
            Err(e) => warn!(message_id = %incoming.message.message_id, error = %e, "relay failed"),
        }
    }

    async fn message_update(
        &self,
        _ctx: Context,
        _old_if_available: Option<Message>,
        _new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        // Partial updates (embed unfurls, pins) carry no content.
        let (Some(guild_id), Some(content)) = (event.guild_id, event.content) else {
            return;
        };
        let author_is_bot = event.author.as_ref().is_some_and(|a| a.bot);
        if author_is_bot || content.trim().is_empty() {
            return;
        }
        let edit = EditedMessage {
            guild_id: GuildId(guild_id.get()),
            message: message_ref(event.channel_id, event.id),
            content,
            author_is_bot,
        };
        if let Err(e) = self.state.services.sync.on_edit(&edit).await {
            warn!(message_id = %edit.message.message_id, error = %e, "edit sync failed");
        }
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: DcChannelId,
        deleted_message_id: DcMessageId,
        _guild_id: Option<DcGuildId>,
    ) {
        let deleted = message_ref(channel_id, deleted_message_id);
        if let Err(e) = self.state.services.sync.on_delete(deleted).await {
            warn!(message_id = %deleted.message_id, error = %e, "delete sync failed");
        }
    }

    async fn reaction_add(&self, _ctx: Context, add_reaction: Reaction) {
        let Some(event) = to_reaction_event(&add_reaction) else {
            return;
        };
        if let Err(e) = self.state.services.sync.on_reaction_add(&event).await {
            warn!(message_id = %event.message.message_id, error = %e, "reaction sync failed");
        }
    }

    async fn reaction_remove(&self, _ctx: Context, removed_reaction: Reaction) {
        let Some(event) = to_reaction_event(&removed_reaction) else {
            return;
        };
        if let Err(e) = self.state.services.sync.on_reaction_remove(&event).await {
            warn!(message_id = %event.message.message_id, error = %e, "reaction sync failed");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(cmd) => commands::handle_command(&ctx, &cmd, &self.state).await,
            Interaction::Autocomplete(ac) => commands::handle_autocomplete(&ctx, &ac).await,
            _ => {}
        }
    }
}
