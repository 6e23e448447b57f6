//! Fan-out of one authored message to every linked translate channel.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::{
    domain::MessageRef,
    formatting::truncate_chars,
    languages::{by_code, Language},
    ledger::MessageLedger,
    links::ChannelLinkCache,
    markup::{protect, ProtectedText},
    model::{ChannelLink, MessageLink, TranslateChannel},
    registry::TranslateChannelRegistry,
    relay::{
        content::{
            add_reply_ping, classify, emoji_image_url, oversized_attachments_warning,
            partition_attachments, source_truncated_warning, target_truncated_warning,
            RelayStrategy, COMMAND_ECHO_PHRASE,
        },
        port::RelayPort,
        reply::{self, ReplyContext},
        types::{Attachment, Embed, IncomingMessage, OutgoingMessage},
    },
    translation::{GuildTranslator, TranslationContext, TranslatorCache, HISTORY_LIMIT},
    Result,
};

pub(crate) const NO_KEY_MESSAGE: &str =
    "Cannot translate, no api key found. Please sign in using the `/sign-in` command.";
pub(crate) const INVALID_KEY_MESSAGE: &str = "Cannot translate, invalid api key. Please check if you changed/disabled the api key then sign in again using the `/sign-in` command with a **valid** api key.";

/// A linked channel the message will be relayed to.
struct Target {
    channel: TranslateChannel,
    language: &'static Language,
}

/// Per-message work shared by every target.
struct Prepared {
    strategy: RelayStrategy,
    body: ProtectedText,
    source_truncated: bool,
    attachments: Vec<Attachment>,
    oversized: usize,
    context: Option<TranslationContext>,
}

struct Dispatched {
    copy: Option<MessageRef>,
    truncated: bool,
}

pub struct RelayPipeline {
    registry: Arc<TranslateChannelRegistry>,
    links: Arc<ChannelLinkCache>,
    ledger: Arc<MessageLedger>,
    translators: Arc<TranslatorCache>,
    port: Arc<dyn RelayPort>,
}

impl RelayPipeline {
    pub fn new(
        registry: Arc<TranslateChannelRegistry>,
        links: Arc<ChannelLinkCache>,
        ledger: Arc<MessageLedger>,
        translators: Arc<TranslatorCache>,
        port: Arc<dyn RelayPort>,
    ) -> Self {
        Self {
            registry,
            links,
            ledger,
            translators,
            port,
        }
    }

    /// Relays `msg` and records the copies. Returns the ledger entry, or
    /// `None` when nothing was relayed.
    pub async fn handle(&self, msg: &IncomingMessage) -> Result<Option<MessageLink>> {
        let origin = msg.message;
        let Some(source) = self.registry.get(origin.channel_id).await? else {
            return Ok(None);
        };
        let Some(link) = self.links.get(origin.channel_id).await? else {
            return Ok(None);
        };

        let from_bot = msg.author.id == self.port.current_user_id();
        let Some(source_language) = by_code(&source.language_code) else {
            if !from_bot {
                self.notify(
                    origin,
                    &format!(
                        "Cannot translate, missing source language for language code `{}`.",
                        source.language_code
                    ),
                )
                .await;
            }
            return Ok(None);
        };

        let translator = match self.translators.get(msg.guild_id).await {
            Ok(Some(t)) => t,
            Ok(None) => {
                if !from_bot {
                    self.notify(origin, NO_KEY_MESSAGE).await;
                }
                return Ok(None);
            }
            Err(e) if e.is_authorization() => {
                if !from_bot {
                    self.notify(origin, INVALID_KEY_MESSAGE).await;
                }
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let targets = self.resolve_targets(&link).await?;
        if targets.is_empty() {
            return Ok(None);
        }

        let mut prepared = self.prepare(msg);
        if prepared.strategy == RelayStrategy::Text
            && !prepared.body.is_untranslatable()
            && translator.uses_context()
        {
            prepared.context = Some(self.context_for(msg).await);
        }
        let results = join_all(targets.iter().map(|target| {
            self.dispatch(msg, &prepared, &translator, source_language, target)
        }))
        .await;

        let limit = self.port.limits().message_chars;
        let mut copies = Vec::with_capacity(targets.len());
        let mut warnings = Vec::new();
        let mut auth_failed = false;
        for (target, result) in targets.iter().zip(results) {
            match result {
                Ok(done) => {
                    copies.extend(done.copy);
                    if done.truncated {
                        warnings.push(target_truncated_warning(target.channel.id, limit));
                    }
                }
                Err(e) if e.is_authorization() => auth_failed = true,
                Err(e) => warn!(
                    channel_id = %target.channel.id,
                    message_id = %origin.message_id,
                    error = %e,
                    "relay to channel failed"
                ),
            }
        }

        if auth_failed {
            self.translators.evict(msg.guild_id).await;
            if !from_bot {
                self.notify(origin, INVALID_KEY_MESSAGE).await;
            }
        }
        if !from_bot {
            self.send_warnings(msg, &prepared, warnings).await;
        }

        if copies.is_empty() {
            return Ok(None);
        }
        let entry = self.ledger.record(msg.author.id, origin, &copies).await?;
        info!(
            message_id = %origin.message_id,
            copies = copies.len(),
            "message relayed"
        );
        Ok(Some(entry))
    }

    /// Linked channels that still have a language and accept text.
    async fn resolve_targets(&self, link: &ChannelLink) -> Result<Vec<Target>> {
        let mut targets = Vec::with_capacity(link.links.len());
        for &id in &link.links {
            if id == link.id {
                continue;
            }
            let Some(channel) = self.registry.get(id).await? else {
                continue;
            };
            let Some(language) = by_code(&channel.language_code) else {
                continue;
            };
            match self.port.is_text_channel(id).await {
                Ok(true) => targets.push(Target { channel, language }),
                Ok(false) => {}
                Err(e) => debug!(channel_id = %id, error = %e, "skipping unreachable channel"),
            }
        }
        Ok(targets)
    }

    fn prepare(&self, msg: &IncomingMessage) -> Prepared {
        let limits = self.port.limits();
        let (source_text, source_truncated) = truncate_chars(&msg.content, limits.message_chars);
        let (attachments, oversized) =
            partition_attachments(&msg.attachments, limits.attachment_bytes);
        Prepared {
            strategy: classify(msg),
            body: protect(&source_text),
            source_truncated,
            attachments,
            oversized,
            context: None,
        }
    }

    /// Recent channel history and the replied-to message. Either part is left
    /// out when it cannot be read.
    async fn context_for(&self, msg: &IncomingMessage) -> TranslationContext {
        let recent = self
            .port
            .recent_messages(msg.message, HISTORY_LIMIT)
            .await
            .unwrap_or_else(|e| {
                debug!(message_id = %msg.message.message_id, error = %e, "history unavailable");
                Vec::new()
            });
        let replying_to = match msg.reply_to {
            Some(id) => {
                let target = MessageRef::new(msg.message.channel_id, id);
                match recent.iter().find(|m| m.message == target) {
                    Some(found) => Some(found.clone()),
                    None => self.port.fetch_message(target).await.ok(),
                }
            }
            None => None,
        };
        TranslationContext::new(msg.author.display_name.clone(), replying_to.as_ref(), &recent)
    }

    async fn dispatch(
        &self,
        msg: &IncomingMessage,
        prepared: &Prepared,
        translator: &GuildTranslator,
        source: &'static Language,
        target: &Target,
    ) -> Result<Dispatched> {
        let reply = match msg.reply_to {
            Some(replied_to) => {
                reply::resolve(&self.ledger, self.port.as_ref(), replied_to, target.channel.id)
                    .await
                    .unwrap_or_else(|e| {
                        debug!(
                            channel_id = %target.channel.id,
                            error = %e,
                            "reply context unavailable"
                        );
                        None
                    })
            }
            None => None,
        };
        let mention = reply.as_ref().and_then(|r| r.mention);
        let reply_embeds = || -> Vec<Embed> {
            reply
                .iter()
                .map(|r: &ReplyContext| r.embed.clone())
                .collect()
        };

        let mut out = OutgoingMessage {
            username: msg.author.display_name.clone(),
            avatar_url: msg.author.avatar_url.clone(),
            content: None,
            embeds: Vec::new(),
            attachments: Vec::new(),
        };
        let mut truncated = false;

        match &prepared.strategy {
            RelayStrategy::CommandEcho {
                command_name,
                invoker,
            } => {
                let english = by_code("en").unwrap_or(source);
                let used = translator
                    .translate(COMMAND_ECHO_PHRASE, english, target.language)
                    .await?;
                out.embeds.push(Embed {
                    author_name: invoker.display_name.clone(),
                    author_icon_url: invoker.avatar_url.clone(),
                    description: format!("{used}: `/{command_name}`"),
                });
            }
            RelayStrategy::Sticker { url } => {
                out.content = add_reply_ping(Some(url.clone()), mention);
                out.embeds = reply_embeds();
            }
            RelayStrategy::LoneEmoji { id, animated } => {
                out.content = Some(if self.port.has_emoji(*id) {
                    msg.content.trim().to_string()
                } else {
                    emoji_image_url(*id, *animated)
                });
                out.attachments = prepared.attachments.clone();
            }
            RelayStrategy::Text => {
                let (text, cut) = self
                    .translate_body(
                        translator,
                        &prepared.body,
                        source,
                        target.language,
                        prepared.context.as_ref(),
                    )
                    .await?;
                truncated = cut;
                let text = Some(text).filter(|t| !t.is_empty());
                out.content = add_reply_ping(text, mention);
                out.embeds = reply_embeds();
                out.attachments = prepared.attachments.clone();
            }
        }

        if out.is_empty() {
            return Ok(Dispatched {
                copy: None,
                truncated,
            });
        }
        let copy = self.port.send_as(target.channel.id, out).await?;
        Ok(Dispatched {
            copy: Some(copy),
            truncated,
        })
    }

    /// Translates protected text and cuts the result to the message limit.
    /// The flag reports whether it was cut.
    pub(crate) async fn translate_body(
        &self,
        translator: &GuildTranslator,
        body: &ProtectedText,
        source: &'static Language,
        target: &'static Language,
        context: Option<&TranslationContext>,
    ) -> Result<(String, bool)> {
        let restored = if body.is_untranslatable() {
            body.restore(&body.text)
        } else {
            let translated = translator
                .translate_in_context(&body.text, source, target, context)
                .await?;
            body.restore(&translated)
        };
        Ok(truncate_chars(&restored, self.port.limits().message_chars))
    }

    /// One reply per truncated target; message-wide warnings lead the first.
    async fn send_warnings(&self, msg: &IncomingMessage, prepared: &Prepared, targets: Vec<String>) {
        let limits = self.port.limits();
        let mut general = Vec::new();
        if prepared.source_truncated && prepared.strategy == RelayStrategy::Text {
            general.push(source_truncated_warning(limits.message_chars));
        }
        if prepared.oversized > 0 {
            general.push(oversized_attachments_warning(
                prepared.oversized,
                msg.message.channel_id,
                limits.attachment_bytes,
            ));
        }

        let mut replies = targets;
        if !general.is_empty() {
            match replies.first_mut() {
                Some(first) => {
                    general.push(std::mem::take(first));
                    *first = general.join("\n");
                }
                None => replies.push(general.join("\n")),
            }
        }
        for reply in replies {
            self.notify(msg.message, &reply).await;
        }
    }

    pub(crate) async fn notify(&self, to: MessageRef, content: &str) {
        if let Err(e) = self.port.reply(to, content).await {
            warn!(message_id = %to.message_id, error = %e, "could not reply to author");
        }
    }

    pub(crate) fn port(&self) -> &dyn RelayPort {
        self.port.as_ref()
    }

    pub(crate) fn translators(&self) -> &TranslatorCache {
        &self.translators
    }

    pub(crate) fn registry(&self) -> &TranslateChannelRegistry {
        &self.registry
    }

    pub(crate) fn ledger(&self) -> &MessageLedger {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        domain::{ChannelId, GuildId, MessageId, UserId},
        model::ChannelLink,
        relay::types::{Author, MessageKind},
        store::{ChannelLinkStore, InMemoryStore},
        testing::{fetched, test_cipher, FakeFactory, FakeRelay, BOT_ID},
        translation::{ProviderKind, RetryPolicy},
        Error,
    };

    const GUILD: GuildId = GuildId(1);

    struct Harness {
        relay: Arc<FakeRelay>,
        factory: Arc<FakeFactory>,
        pipeline: RelayPipeline,
    }

    /// Channels 1 (en), 2 (ja) and 3 (fr); 1 relays to 2 and 3. `provider`
    /// signs the guild in with key `key`.
    async fn harness(provider: Option<ProviderKind>) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(TranslateChannelRegistry::new(store.clone()));
        for (id, code) in [(1, "en"), (2, "ja"), (3, "fr")] {
            registry.set(ChannelId(id), GUILD, code).await.unwrap();
        }
        let mut link = ChannelLink::new(ChannelId(1), GUILD);
        link.links = vec![ChannelId(2), ChannelId(3)];
        store.upsert_channel_link(&link).await.unwrap();

        let factory = Arc::new(FakeFactory::default());
        let translators = Arc::new(TranslatorCache::new(
            store.clone(),
            Some(Arc::new(test_cipher())),
            factory.clone(),
            RetryPolicy {
                max_retries: 1,
                base: Duration::from_millis(1),
            },
        ));
        if let Some(kind) = provider {
            translators
                .set(GUILD, &[(kind, "key".to_string())], None)
                .await
                .unwrap();
        }

        let relay = Arc::new(FakeRelay::new());
        let pipeline = RelayPipeline::new(
            registry,
            Arc::new(ChannelLinkCache::new(store.clone())),
            Arc::new(MessageLedger::new(store)),
            translators,
            relay.clone(),
        );
        Harness {
            relay,
            factory,
            pipeline,
        }
    }

    fn incoming(id: u64, content: &str) -> IncomingMessage {
        IncomingMessage {
            guild_id: GUILD,
            message: MessageRef::new(ChannelId(1), MessageId(id)),
            author: Author {
                id: UserId(7),
                display_name: "ana".into(),
                avatar_url: Some("https://cdn.example/ana.png".into()),
                is_bot: false,
            },
            kind: MessageKind::Regular,
            content: content.to_string(),
            attachments: vec![],
            sticker_id: None,
            reply_to: None,
        }
    }

    fn contents(relay: &FakeRelay) -> Vec<(ChannelId, Option<String>)> {
        relay
            .sends()
            .into_iter()
            .map(|(channel, out)| (channel, out.content))
            .collect()
    }

    #[tokio::test]
    async fn relays_translated_text_and_records_copies() {
        let h = harness(Some(ProviderKind::DeepL)).await;
        let entry = h.pipeline.handle(&incoming(10, "hello")).await.unwrap().unwrap();

        assert_eq!(
            contents(&h.relay),
            vec![
                (ChannelId(2), Some("[ja] hello".to_string())),
                (ChannelId(3), Some("[fr] hello".to_string())),
            ]
        );
        let (_, first) = &h.relay.sends()[0];
        assert_eq!(first.username, "ana");
        assert_eq!(first.avatar_url.as_deref(), Some("https://cdn.example/ana.png"));

        assert_eq!(entry.author_id, UserId(7));
        assert_eq!(entry.links.len(), 3);
        assert_eq!(entry.origin(), MessageRef::new(ChannelId(1), MessageId(10)));
        assert!(entry.in_channel(ChannelId(2)).is_some());
        assert!(entry.in_channel(ChannelId(3)).is_some());
    }

    #[tokio::test]
    async fn long_message_is_cut_and_warned_once_per_target() {
        let h = harness(Some(ProviderKind::DeepL)).await;
        h.pipeline
            .handle(&incoming(10, &"a".repeat(2500)))
            .await
            .unwrap()
            .unwrap();

        for (_, out) in h.relay.sends() {
            assert_eq!(out.content.unwrap().chars().count(), 2000);
        }
        let replies = h.relay.replies();
        assert_eq!(replies.len(), 2);
        assert!(replies[0].1.contains("You sent a message over 2000 characters"));
        assert!(replies[0].1.contains("translated message in <#2>"));
        assert!(replies[1].1.contains("translated message in <#3>"));
        assert!(!replies[1].1.contains("You sent"));
    }

    #[tokio::test]
    async fn one_failing_target_does_not_stop_the_others() {
        let h = harness(Some(ProviderKind::DeepL)).await;
        h.relay.fail_channel(ChannelId(2));

        let entry = h.pipeline.handle(&incoming(10, "hello")).await.unwrap().unwrap();
        assert_eq!(entry.links.len(), 2);
        assert!(entry.in_channel(ChannelId(2)).is_none());
        assert!(entry.in_channel(ChannelId(3)).is_some());
    }

    #[tokio::test]
    async fn missing_key_is_reported_to_humans_only() {
        let h = harness(None).await;
        assert!(h.pipeline.handle(&incoming(10, "hello")).await.unwrap().is_none());
        assert_eq!(h.relay.replies().len(), 1);
        assert_eq!(h.relay.replies()[0].1, NO_KEY_MESSAGE);
        assert!(h.relay.sends().is_empty());

        let mut from_bot = incoming(11, "hello");
        from_bot.author.id = BOT_ID;
        assert!(h.pipeline.handle(&from_bot).await.unwrap().is_none());
        assert_eq!(h.relay.replies().len(), 1);
    }

    #[tokio::test]
    async fn rejected_key_mid_relay_notifies_once() {
        let h = harness(Some(ProviderKind::DeepL)).await;
        let provider = h.factory.provider("key").unwrap();
        provider.fail_next(Error::Authorization(vec![ProviderKind::DeepL]));

        let entry = h.pipeline.handle(&incoming(10, "hello")).await.unwrap().unwrap();
        assert_eq!(entry.links.len(), 2);
        let replies = h.relay.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1, INVALID_KEY_MESSAGE);
    }

    #[tokio::test]
    async fn stickers_are_linked_untranslated() {
        let h = harness(Some(ProviderKind::DeepL)).await;
        let mut msg = incoming(10, "");
        msg.sticker_id = Some(77);
        h.pipeline.handle(&msg).await.unwrap().unwrap();

        for (_, content) in contents(&h.relay) {
            assert_eq!(
                content.as_deref(),
                Some("https://media.discordapp.net/stickers/77.webp")
            );
        }
        assert!(h.factory.provider("key").unwrap().calls().is_empty());
    }

    #[tokio::test]
    async fn lone_emoji_falls_back_to_image_when_unknown() {
        let h = harness(Some(ProviderKind::DeepL)).await;
        h.pipeline.handle(&incoming(10, "<:wave:55>")).await.unwrap();
        assert_eq!(
            h.relay.sends()[0].1.content.as_deref(),
            Some("https://media.discordapp.net/emojis/55.png?size=48")
        );

        h.relay.add_emoji(55);
        h.pipeline.handle(&incoming(11, "<:wave:55>")).await.unwrap();
        assert_eq!(h.relay.sends()[2].1.content.as_deref(), Some("<:wave:55>"));
    }

    #[tokio::test]
    async fn command_echo_becomes_translated_embed() {
        let h = harness(Some(ProviderKind::DeepL)).await;
        let mut msg = incoming(10, "");
        msg.author.id = BOT_ID;
        msg.kind = MessageKind::CommandEcho {
            command_name: "link".into(),
            invoker: Author {
                id: UserId(7),
                display_name: "ana".into(),
                avatar_url: None,
                is_bot: false,
            },
        };
        h.pipeline.handle(&msg).await.unwrap().unwrap();

        let (channel, out) = &h.relay.sends()[0];
        assert_eq!(*channel, ChannelId(2));
        assert_eq!(out.content, None);
        assert_eq!(out.embeds[0].author_name, "ana");
        assert_eq!(out.embeds[0].description, "[ja] Used: `/link`");
    }

    #[tokio::test]
    async fn replies_carry_preview_and_ping() {
        let h = harness(Some(ProviderKind::DeepL)).await;
        let first = h.pipeline.handle(&incoming(10, "hello")).await.unwrap().unwrap();
        let copy = first.in_channel(ChannelId(2)).unwrap();
        let mut fetched_copy = fetched(copy, "[ja] hello");
        fetched_copy.is_relay = true;
        h.relay.put_message(fetched_copy);

        let mut answer = incoming(11, "thanks");
        answer.author.id = UserId(8);
        answer.reply_to = Some(MessageId(10));
        h.pipeline.handle(&answer).await.unwrap().unwrap();

        let sends = h.relay.sends();
        let (channel, out) = &sends[2];
        assert_eq!(*channel, ChannelId(2));
        assert_eq!(out.content.as_deref(), Some("[ja] thanks <@7>"));
        assert!(out.embeds[0].description.ends_with("[ja] hello"));
        // No copy of the replied-to message was fetched for channel 3.
        assert!(sends[3].1.embeds.is_empty());
    }

    #[tokio::test]
    async fn chat_providers_see_recent_history_and_reply_target() {
        let h = harness(Some(ProviderKind::OpenAi)).await;
        let mut question = fetched(MessageRef::new(ChannelId(1), MessageId(8)), "did the build pass?");
        question.author.display_name = "bob".into();
        h.relay.put_message(question);
        h.relay
            .put_message(fetched(MessageRef::new(ChannelId(1), MessageId(9)), "checking"));
        h.relay
            .put_message(fetched(MessageRef::new(ChannelId(2), MessageId(5)), "elsewhere"));

        let mut answer = incoming(10, "it did");
        answer.reply_to = Some(MessageId(8));
        h.pipeline.handle(&answer).await.unwrap().unwrap();

        let contexts = h.factory.provider("key").unwrap().contexts();
        assert_eq!(contexts.len(), 2);
        let context = &contexts[0];
        assert_eq!(context.author, "ana");
        assert_eq!(
            context.replying_to.as_ref().map(|m| m.content.as_str()),
            Some("did the build pass?")
        );
        let history: Vec<_> = context.history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(history, ["did the build pass?", "checking"]);
    }

    #[tokio::test]
    async fn plain_providers_get_no_context() {
        let h = harness(Some(ProviderKind::DeepL)).await;
        h.relay
            .put_message(fetched(MessageRef::new(ChannelId(1), MessageId(9)), "earlier"));
        h.pipeline.handle(&incoming(10, "hello")).await.unwrap().unwrap();

        let provider = h.factory.provider("key").unwrap();
        assert_eq!(provider.calls().len(), 2);
        assert!(provider.contexts().is_empty());
    }

    #[tokio::test]
    async fn oversized_attachments_stay_behind() {
        let h = harness(Some(ProviderKind::DeepL)).await;
        let mut msg = incoming(10, "");
        msg.attachments = vec![
            Attachment {
                url: "https://cdn.example/a.png".into(),
                filename: "a.png".into(),
                size: 1024,
            },
            Attachment {
                url: "https://cdn.example/b.mov".into(),
                filename: "b.mov".into(),
                size: 30 * 1024 * 1024,
            },
        ];
        h.pipeline.handle(&msg).await.unwrap().unwrap();

        for (_, out) in h.relay.sends() {
            assert_eq!(out.attachments.len(), 1);
            assert_eq!(out.attachments[0].filename, "a.png");
            assert_eq!(out.content, None);
        }
        let replies = h.relay.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].1.contains("You sent an attachment over 25MB (in <#1>)"));
    }

    #[tokio::test]
    async fn non_text_targets_are_skipped() {
        let h = harness(Some(ProviderKind::DeepL)).await;
        h.relay.set_non_text(ChannelId(3));
        h.pipeline.handle(&incoming(10, "hello")).await.unwrap().unwrap();
        assert_eq!(h.relay.sends().len(), 1);
    }

    #[tokio::test]
    async fn unlinked_channels_are_ignored() {
        let h = harness(Some(ProviderKind::DeepL)).await;
        let mut msg = incoming(10, "hello");
        msg.message = MessageRef::new(ChannelId(2), MessageId(10));
        assert!(h.pipeline.handle(&msg).await.unwrap().is_none());
        assert!(h.relay.replies().is_empty());
    }
}
