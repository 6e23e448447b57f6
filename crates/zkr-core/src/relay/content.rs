//! How one authored message turns into relay content.

use std::sync::OnceLock;

use regex::Regex;

use crate::{
    domain::{ChannelId, UserId},
    relay::types::{Attachment, Author, IncomingMessage, MessageKind},
};

/// Phrase translated for command echoes.
pub const COMMAND_ECHO_PHRASE: &str = "Used";

/// Which relay branch a message takes. The first matching branch wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayStrategy {
    CommandEcho { command_name: String, invoker: Author },
    Sticker { url: String },
    LoneEmoji { id: u64, animated: bool },
    Text,
}

fn lone_emoji_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<(a?):[^<>:]*:(\d+)>$").expect("valid regex"))
}

pub fn classify(msg: &IncomingMessage) -> RelayStrategy {
    if let MessageKind::CommandEcho {
        command_name,
        invoker,
    } = &msg.kind
    {
        return RelayStrategy::CommandEcho {
            command_name: command_name.clone(),
            invoker: invoker.clone(),
        };
    }

    let trimmed = msg.content.trim();
    if let Some(id) = msg.sticker_id {
        if trimmed.is_empty() {
            return RelayStrategy::Sticker {
                url: sticker_url(id),
            };
        }
    }

    if msg.reply_to.is_none() {
        if let Some(caps) = lone_emoji_re().captures(trimmed) {
            if let Ok(id) = caps[2].parse::<u64>() {
                return RelayStrategy::LoneEmoji {
                    id,
                    animated: !caps[1].is_empty(),
                };
            }
        }
    }

    RelayStrategy::Text
}

pub fn sticker_url(id: u64) -> String {
    format!("https://media.discordapp.net/stickers/{id}.webp")
}

/// Image link shown where the bot cannot render a custom emoji.
pub fn emoji_image_url(id: u64, animated: bool) -> String {
    let ext = if animated { "gif" } else { "png" };
    format!("https://media.discordapp.net/emojis/{id}.{ext}?size=48")
}

/// Splits attachments into those within `limit` bytes and the count of the
/// rest.
pub fn partition_attachments(attachments: &[Attachment], limit: u64) -> (Vec<Attachment>, usize) {
    let kept: Vec<Attachment> = attachments
        .iter()
        .filter(|a| a.size <= limit)
        .cloned()
        .collect();
    let oversized = attachments.len() - kept.len();
    (kept, oversized)
}

/// Appends ` <@user>` so the quoted author still gets a notification.
pub fn add_reply_ping(content: Option<String>, user: Option<UserId>) -> Option<String> {
    let Some(user) = user else {
        return content;
    };
    let mention = user.mention();
    match content {
        Some(text) if text.contains(&mention) => Some(text),
        Some(text) if !text.is_empty() => Some(format!("{text} {mention}")),
        _ => Some(mention),
    }
}

// ============== Warnings ==============

pub fn source_truncated_warning(limit: usize) -> String {
    format!(
        "**Warning:** You sent a message over {limit} characters. Due to Discord's characters limit, only the first {limit} characters will be translated."
    )
}

pub fn target_truncated_warning(channel: ChannelId, limit: usize) -> String {
    format!(
        "**Warning:** The translated message in {} is over {limit} characters. Due to Discord's characters limit, only the first {limit} characters will be shown.",
        channel.mention()
    )
}

pub fn edit_truncated_warning(limit: usize) -> String {
    format!(
        "**Warning:** You edited the message over {limit} characters. Due to Discord's characters limit, only the first {limit} characters will be translated."
    )
}

pub fn oversized_attachments_warning(count: usize, origin: ChannelId, limit_bytes: u64) -> String {
    let mb = limit_bytes / (1024 * 1024);
    let (what, pronoun) = if count == 1 {
        ("an attachment".to_string(), "it")
    } else {
        (format!("{count} attachments"), "they")
    };
    format!(
        "**Warning:** You sent {what} over {mb}MB (in {}). Due to Discord's attachment size limit, {pronoun} won't be sent to other translate channels.",
        origin.mention()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GuildId, MessageId, MessageRef};

    fn message(content: &str) -> IncomingMessage {
        IncomingMessage {
            guild_id: GuildId(1),
            message: MessageRef::new(ChannelId(2), MessageId(3)),
            author: Author {
                id: UserId(4),
                display_name: "ana".into(),
                avatar_url: None,
                is_bot: false,
            },
            kind: MessageKind::Regular,
            content: content.to_string(),
            attachments: vec![],
            sticker_id: None,
            reply_to: None,
        }
    }

    #[test]
    fn command_echo_wins_over_everything() {
        let mut msg = message("<:wave:1>");
        msg.sticker_id = Some(5);
        msg.kind = MessageKind::CommandEcho {
            command_name: "link".into(),
            invoker: msg.author.clone(),
        };
        assert!(matches!(classify(&msg), RelayStrategy::CommandEcho { .. }));
    }

    #[test]
    fn sticker_needs_empty_text() {
        let mut msg = message("");
        msg.sticker_id = Some(77);
        assert_eq!(
            classify(&msg),
            RelayStrategy::Sticker {
                url: "https://media.discordapp.net/stickers/77.webp".into()
            }
        );

        msg.content = "look".into();
        assert_eq!(classify(&msg), RelayStrategy::Text);
    }

    #[test]
    fn lone_emoji_only_without_reply() {
        let mut msg = message("  <a:party:123>  ");
        assert_eq!(
            classify(&msg),
            RelayStrategy::LoneEmoji {
                id: 123,
                animated: true
            }
        );

        msg.reply_to = Some(MessageId(9));
        assert_eq!(classify(&msg), RelayStrategy::Text);

        assert_eq!(classify(&message("<:a:1> <:b:2>")), RelayStrategy::Text);
        assert_eq!(classify(&message("hi <:a:1>")), RelayStrategy::Text);
    }

    #[test]
    fn emoji_fallback_url_reflects_animation() {
        assert_eq!(
            emoji_image_url(5, false),
            "https://media.discordapp.net/emojis/5.png?size=48"
        );
        assert!(emoji_image_url(5, true).contains("5.gif"));
    }

    #[test]
    fn reply_ping_is_added_once() {
        assert_eq!(
            add_reply_ping(Some("hi".into()), Some(UserId(8))),
            Some("hi <@8>".into())
        );
        assert_eq!(
            add_reply_ping(Some("hi <@8>".into()), Some(UserId(8))),
            Some("hi <@8>".into())
        );
        assert_eq!(add_reply_ping(None, Some(UserId(8))), Some("<@8>".into()));
        assert_eq!(add_reply_ping(Some("x".into()), None), Some("x".into()));
    }

    #[test]
    fn partitions_oversized_attachments() {
        let small = Attachment {
            url: "u1".into(),
            filename: "a.png".into(),
            size: 10,
        };
        let big = Attachment {
            url: "u2".into(),
            filename: "b.mov".into(),
            size: 30,
        };
        let (kept, oversized) = partition_attachments(&[small.clone(), big], 20);
        assert_eq!(kept, vec![small]);
        assert_eq!(oversized, 1);
    }

    #[test]
    fn attachment_warning_counts() {
        let one = oversized_attachments_warning(1, ChannelId(3), 25 * 1024 * 1024);
        assert!(one.contains("an attachment over 25MB (in <#3>)"));
        assert!(one.contains(", it won't"));
        let many = oversized_attachments_warning(2, ChannelId(3), 25 * 1024 * 1024);
        assert!(many.contains("2 attachments"));
        assert!(many.contains("they won't"));
    }
}
