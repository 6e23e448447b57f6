//! Keeps relayed copies in step with the message they were made from.
//!
//! Every handler is best effort: a copy that cannot be reached is logged and
//! skipped, and nothing here is reported back to users except size warnings
//! on edits.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::{
    domain::MessageRef,
    formatting::truncate_chars,
    languages::by_code,
    markup::protect,
    relay::{
        content::{edit_truncated_warning, target_truncated_warning},
        EditedMessage, RelayPipeline, ReactionEvent,
    },
    Result,
};

pub struct SyncHandlers {
    pipeline: Arc<RelayPipeline>,
}

impl SyncHandlers {
    pub fn new(pipeline: Arc<RelayPipeline>) -> Self {
        Self { pipeline }
    }

    /// Re-translates every copy of an edited origin message in place.
    ///
    /// Bot-authored edits and edits that leave no text are ignored, so a
    /// deferred command response or an embed-only update never blanks the
    /// copies.
    pub async fn on_edit(&self, edit: &EditedMessage) -> Result<()> {
        if edit.author_is_bot || edit.content.trim().is_empty() {
            return Ok(());
        }
        let pipeline = &self.pipeline;
        let origin = edit.message;
        let Some(entry) = pipeline.ledger().find_by_origin(origin.message_id).await? else {
            return Ok(());
        };
        let Some(source) = pipeline.registry().get(entry.channel_id).await? else {
            return Ok(());
        };
        let Some(source_language) = by_code(&source.language_code) else {
            return Ok(());
        };
        let translator = match pipeline.translators().get(edit.guild_id).await {
            Ok(Some(t)) => t,
            Ok(None) => return Ok(()),
            Err(e) if e.is_authorization() => {
                debug!(guild_id = %edit.guild_id, "edit not synced, credentials rejected");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let limit = pipeline.port().limits().message_chars;
        let (text, source_truncated) = truncate_chars(&edit.content, limit);
        let body = protect(&text);

        let copies = entry.others(origin.message_id);
        let edits = copies.iter().map(|&copy| {
            let translator = translator.clone();
            let body = &body;
            async move {
                let Some(target) = pipeline.registry().get(copy.channel_id).await? else {
                    return Ok(None);
                };
                let Some(target_language) = by_code(&target.language_code) else {
                    return Ok(None);
                };
                let (translated, cut) = pipeline
                    .translate_body(&translator, body, source_language, target_language, None)
                    .await?;
                pipeline.port().edit_relayed(copy, &translated).await?;
                Ok::<_, crate::Error>(Some(cut))
            }
        });
        let results = join_all(edits).await;

        let mut warnings = Vec::new();
        if source_truncated {
            warnings.push(edit_truncated_warning(limit));
        }
        let mut auth_failed = false;
        for (copy, result) in copies.iter().zip(results) {
            match result {
                Ok(Some(true)) => warnings.push(target_truncated_warning(copy.channel_id, limit)),
                Ok(_) => {}
                Err(e) if e.is_authorization() => auth_failed = true,
                Err(e) => warn!(
                    message_id = %copy.message_id,
                    error = %e,
                    "could not edit relayed copy"
                ),
            }
        }
        if auth_failed {
            pipeline.translators().evict(edit.guild_id).await;
        }
        if !warnings.is_empty() {
            pipeline.notify(origin, &warnings.join("\n")).await;
        }
        Ok(())
    }

    /// Deletes every other message of the entry `deleted` belongs to, then
    /// the entry itself. `deleted` may be the origin or any copy.
    pub async fn on_delete(&self, deleted: MessageRef) -> Result<()> {
        let pipeline = &self.pipeline;
        let Some(entry) = pipeline
            .ledger()
            .find_by_participant(deleted.message_id)
            .await?
        else {
            return Ok(());
        };

        let others = entry.others(deleted.message_id);
        let results = join_all(
            others
                .iter()
                .map(|&message| pipeline.port().delete_message(message)),
        )
        .await;
        for (message, result) in others.iter().zip(results) {
            if let Err(e) = result {
                if e.is_not_found() {
                    continue;
                }
                warn!(message_id = %message.message_id, error = %e, "could not delete relayed copy");
            }
        }

        pipeline.ledger().delete_by_origin(entry.message_id).await?;
        info!(
            origin_id = %entry.message_id,
            deleted = others.len(),
            "relayed copies deleted"
        );
        Ok(())
    }

    /// Mirrors a reaction onto every other message of the entry. Emoji the
    /// bot cannot use are skipped silently.
    pub async fn on_reaction_add(&self, event: &ReactionEvent) -> Result<()> {
        let pipeline = &self.pipeline;
        if event.user_id == pipeline.port().current_user_id() {
            return Ok(());
        }
        let Some(entry) = pipeline
            .ledger()
            .find_by_participant(event.message.message_id)
            .await?
        else {
            return Ok(());
        };

        let others = entry.others(event.message.message_id);
        let results = join_all(
            others
                .iter()
                .map(|&message| pipeline.port().add_reaction(message, &event.emoji)),
        )
        .await;
        for (message, result) in others.iter().zip(results) {
            if let Err(e) = result {
                debug!(message_id = %message.message_id, error = %e, "reaction not mirrored");
            }
        }
        Ok(())
    }

    /// Only the original author's removals are mirrored.
    pub async fn on_reaction_remove(&self, event: &ReactionEvent) -> Result<()> {
        let pipeline = &self.pipeline;
        if event.user_id == pipeline.port().current_user_id() {
            return Ok(());
        }
        let Some(entry) = pipeline
            .ledger()
            .find_by_participant(event.message.message_id)
            .await?
        else {
            return Ok(());
        };
        if event.user_id != entry.author_id {
            return Ok(());
        }

        let others = entry.others(event.message.message_id);
        let results = join_all(
            others
                .iter()
                .map(|&message| pipeline.port().remove_own_reaction(message, &event.emoji)),
        )
        .await;
        for (message, result) in others.iter().zip(results) {
            if let Err(e) = result {
                debug!(message_id = %message.message_id, error = %e, "reaction removal not mirrored");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        domain::{ChannelId, GuildId, MessageId, UserId},
        ledger::MessageLedger,
        links::ChannelLinkCache,
        registry::TranslateChannelRegistry,
        relay::ReactionEmoji,
        store::InMemoryStore,
        testing::{test_cipher, FakeFactory, FakeRelay, BOT_ID},
        translation::{ProviderKind, RetryPolicy, TranslatorCache},
    };

    const GUILD: GuildId = GuildId(1);
    const AUTHOR: UserId = UserId(7);

    fn msg(channel: u64, id: u64) -> MessageRef {
        MessageRef::new(ChannelId(channel), MessageId(id))
    }

    struct Harness {
        relay: Arc<FakeRelay>,
        ledger: Arc<MessageLedger>,
        sync: SyncHandlers,
    }

    /// Origin 100 in channel 1 (en) with copies in channels 2 (ja), 3 (fr)
    /// and 4 (de).
    async fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(TranslateChannelRegistry::new(store.clone()));
        for (id, code) in [(1, "en"), (2, "ja"), (3, "fr"), (4, "de")] {
            registry.set(ChannelId(id), GUILD, code).await.unwrap();
        }
        let translators = Arc::new(TranslatorCache::new(
            store.clone(),
            Some(Arc::new(test_cipher())),
            Arc::new(FakeFactory::default()),
            RetryPolicy {
                max_retries: 1,
                base: Duration::from_millis(1),
            },
        ));
        translators
            .set(GUILD, &[(ProviderKind::DeepL, "key".to_string())], None)
            .await
            .unwrap();

        let ledger = Arc::new(MessageLedger::new(store.clone()));
        ledger
            .record(AUTHOR, msg(1, 100), &[msg(2, 200), msg(3, 300), msg(4, 400)])
            .await
            .unwrap();

        let relay = Arc::new(FakeRelay::new());
        let pipeline = Arc::new(RelayPipeline::new(
            registry,
            Arc::new(ChannelLinkCache::new(store)),
            ledger.clone(),
            translators,
            relay.clone(),
        ));
        Harness {
            relay,
            ledger,
            sync: SyncHandlers::new(pipeline),
        }
    }

    fn reaction(message: MessageRef, user: UserId) -> ReactionEvent {
        ReactionEvent {
            message,
            user_id: user,
            emoji: ReactionEmoji::Unicode("👍".into()),
        }
    }

    #[tokio::test]
    async fn deleting_origin_removes_every_copy_and_the_entry() {
        let h = harness().await;
        h.sync.on_delete(msg(1, 100)).await.unwrap();

        assert_eq!(h.relay.deletes(), vec![msg(2, 200), msg(3, 300), msg(4, 400)]);
        assert!(h.ledger.find_by_origin(MessageId(100)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_a_copy_cascades_through_the_participant_lookup() {
        let h = harness().await;
        h.relay.fail_channel(ChannelId(3));
        h.sync.on_delete(msg(2, 200)).await.unwrap();

        assert_eq!(h.relay.deletes(), vec![msg(1, 100), msg(4, 400)]);
        assert!(h
            .ledger
            .find_by_participant(MessageId(300))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unknown_messages_are_ignored() {
        let h = harness().await;
        h.sync.on_delete(msg(9, 999)).await.unwrap();
        assert!(h.relay.deletes().is_empty());
    }

    #[tokio::test]
    async fn edits_rewrite_each_copy() {
        let h = harness().await;
        h.sync
            .on_edit(&EditedMessage {
                guild_id: GUILD,
                message: msg(1, 100),
                content: "hi <@5>".into(),
                author_is_bot: false,
            })
            .await
            .unwrap();

        assert_eq!(
            h.relay.edits(),
            vec![
                (msg(2, 200), "[ja] hi <@5>".to_string()),
                (msg(3, 300), "[fr] hi <@5>".to_string()),
                (msg(4, 400), "[de] hi <@5>".to_string()),
            ]
        );
        assert!(h.relay.replies().is_empty());
    }

    #[tokio::test]
    async fn edits_to_copies_are_not_synced() {
        let h = harness().await;
        h.sync
            .on_edit(&EditedMessage {
                guild_id: GUILD,
                message: msg(2, 200),
                content: "changed".into(),
                author_is_bot: false,
            })
            .await
            .unwrap();
        assert!(h.relay.edits().is_empty());
    }

    #[tokio::test]
    async fn blank_edits_leave_copies_untouched() {
        let h = harness().await;
        for content in ["", "  \n "] {
            h.sync
                .on_edit(&EditedMessage {
                    guild_id: GUILD,
                    message: msg(1, 100),
                    content: content.into(),
                    author_is_bot: false,
                })
                .await
                .unwrap();
        }
        assert!(h.relay.edits().is_empty());
        assert!(h.relay.replies().is_empty());
    }

    #[tokio::test]
    async fn bot_edits_are_not_synced() {
        let h = harness().await;
        h.sync
            .on_edit(&EditedMessage {
                guild_id: GUILD,
                message: msg(1, 100),
                content: "Here are the linked channels".into(),
                author_is_bot: true,
            })
            .await
            .unwrap();
        assert!(h.relay.edits().is_empty());
    }

    #[tokio::test]
    async fn long_edits_warn_once() {
        let h = harness().await;
        h.sync
            .on_edit(&EditedMessage {
                guild_id: GUILD,
                message: msg(1, 100),
                content: "b".repeat(2100),
                author_is_bot: false,
            })
            .await
            .unwrap();

        for (_, content) in h.relay.edits() {
            assert_eq!(content.chars().count(), 2000);
        }
        let replies = h.relay.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].1.starts_with("**Warning:** You edited the message"));
    }

    #[tokio::test]
    async fn reactions_are_mirrored_and_failures_swallowed() {
        let h = harness().await;
        h.sync
            .on_reaction_add(&reaction(msg(3, 300), UserId(8)))
            .await
            .unwrap();
        let added: Vec<_> = h.relay.reactions_added().into_iter().map(|(m, _)| m).collect();
        assert_eq!(added, vec![msg(1, 100), msg(2, 200), msg(4, 400)]);

        h.relay.fail_reactions();
        h.sync
            .on_reaction_add(&reaction(msg(1, 100), UserId(8)))
            .await
            .unwrap();
        assert_eq!(h.relay.reactions_added().len(), 3);
    }

    #[tokio::test]
    async fn the_bots_own_reactions_are_not_mirrored() {
        let h = harness().await;
        h.sync
            .on_reaction_add(&reaction(msg(2, 200), BOT_ID))
            .await
            .unwrap();
        assert!(h.relay.reactions_added().is_empty());
    }

    #[tokio::test]
    async fn only_the_author_removes_mirrored_reactions() {
        let h = harness().await;
        h.sync
            .on_reaction_remove(&reaction(msg(1, 100), UserId(8)))
            .await
            .unwrap();
        assert!(h.relay.reactions_removed().is_empty());

        h.sync
            .on_reaction_remove(&reaction(msg(1, 100), AUTHOR))
            .await
            .unwrap();
        assert_eq!(h.relay.reactions_removed().len(), 3);
    }
}
