//! Reply previews for relayed replies.

use crate::{
    domain::{ChannelId, MessageId, UserId},
    formatting::preview_line,
    ledger::MessageLedger,
    relay::{
        port::RelayPort,
        types::{Embed, FetchedMessage},
    },
    Result,
};

const PREVIEW_CHARS: usize = 77;

/// What a relayed reply shows about the message it answers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyContext {
    pub embed: Embed,
    /// Author to ping so the reply still notifies them.
    pub mention: Option<UserId>,
}

/// Resolves the copy of `replied_to` living in `target` and builds its
/// preview. `None` when the replied-to message was never relayed there or is
/// gone.
pub async fn resolve(
    ledger: &MessageLedger,
    port: &dyn RelayPort,
    replied_to: MessageId,
    target: ChannelId,
) -> Result<Option<ReplyContext>> {
    let Some(entry) = ledger.find_by_participant(replied_to).await? else {
        return Ok(None);
    };
    let Some(copy) = entry.in_channel(target) else {
        return Ok(None);
    };

    let fetched = match port.fetch_message(copy).await {
        Ok(m) => m,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e),
    };

    let bot = port.current_user_id();
    let mention = if fetched.is_relay {
        // Relay copies show the original author; ping them instead.
        Some(entry.author_id).filter(|id| *id != bot)
    } else if !fetched.author.is_bot {
        Some(fetched.author.id)
    } else {
        None
    };

    Ok(Some(ReplyContext {
        embed: Embed {
            author_name: fetched.author.display_name.clone(),
            author_icon_url: fetched.author.avatar_url.clone(),
            description: preview(&fetched),
        },
        mention,
    }))
}

pub fn preview(fetched: &FetchedMessage) -> String {
    let url = &fetched.url;
    let text = preview_line(&fetched.content, PREVIEW_CHARS);
    if !text.is_empty() {
        return format!("**[Replying to:]({url})** {text}");
    }
    if fetched.has_stickers && !fetched.has_attachments {
        return format!("**[Replying to a sticker]({url})**");
    }
    format!("**[Replying to an attachment]({url})**")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        domain::MessageRef,
        relay::types::Author,
        store::InMemoryStore,
        testing::{fetched, FakeRelay},
    };

    fn msg(channel: u64, id: u64) -> MessageRef {
        MessageRef::new(ChannelId(channel), MessageId(id))
    }

    #[test]
    fn preview_cuts_long_quotes() {
        let mut m = fetched(msg(1, 1), &"a".repeat(100));
        m.url = "https://discord.com/channels/1/1/1".into();
        let p = preview(&m);
        assert_eq!(
            p,
            format!(
                "**[Replying to:](https://discord.com/channels/1/1/1)** {}...",
                "a".repeat(77)
            )
        );
    }

    #[test]
    fn preview_placeholders_for_empty_text() {
        let mut m = fetched(msg(1, 1), "");
        m.has_stickers = true;
        assert!(preview(&m).starts_with("**[Replying to a sticker]"));
        m.has_stickers = false;
        m.has_attachments = true;
        assert!(preview(&m).starts_with("**[Replying to an attachment]"));
    }

    #[tokio::test]
    async fn resolves_copy_in_target_channel_and_pings_author() {
        let ledger = MessageLedger::new(Arc::new(InMemoryStore::new()));
        ledger
            .record(UserId(42), msg(1, 100), &[msg(2, 200), msg(3, 300)])
            .await
            .unwrap();

        let relay = FakeRelay::new();
        let mut copy = fetched(msg(3, 300), "bonjour");
        copy.is_relay = true;
        relay.put_message(copy);

        // Replying (in channel 2) to the copy in channel 2; channel 3 shows
        // the copy living in channel 3.
        let ctx = resolve(&ledger, &relay, MessageId(200), ChannelId(3))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ctx.mention, Some(UserId(42)));
        assert!(ctx.embed.description.ends_with("bonjour"));
    }

    #[tokio::test]
    async fn human_origin_is_pinged_and_bots_are_not() {
        let ledger = MessageLedger::new(Arc::new(InMemoryStore::new()));
        ledger.record(UserId(42), msg(1, 100), &[msg(2, 200)]).await.unwrap();

        let relay = FakeRelay::new();
        let mut origin = fetched(msg(1, 100), "hello");
        origin.author.id = UserId(42);
        relay.put_message(origin);
        let ctx = resolve(&ledger, &relay, MessageId(200), ChannelId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ctx.mention, Some(UserId(42)));

        let mut from_bot = fetched(msg(1, 100), "hello");
        from_bot.author = Author {
            id: UserId(50),
            display_name: "bot".into(),
            avatar_url: None,
            is_bot: true,
        };
        relay.put_message(from_bot);
        let ctx = resolve(&ledger, &relay, MessageId(200), ChannelId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ctx.mention, None);
    }

    #[tokio::test]
    async fn missing_copy_or_message_yields_none() {
        let ledger = MessageLedger::new(Arc::new(InMemoryStore::new()));
        ledger.record(UserId(42), msg(1, 100), &[msg(2, 200)]).await.unwrap();
        let relay = FakeRelay::new();

        assert!(resolve(&ledger, &relay, MessageId(200), ChannelId(9))
            .await
            .unwrap()
            .is_none());
        // Copy exists in the ledger but was deleted on Discord.
        assert!(resolve(&ledger, &relay, MessageId(100), ChannelId(2))
            .await
            .unwrap()
            .is_none());
        assert!(resolve(&ledger, &relay, MessageId(999), ChannelId(2))
            .await
            .unwrap()
            .is_none());
    }
}
