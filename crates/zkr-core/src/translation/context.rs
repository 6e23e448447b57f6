//! Conversation context handed to providers that can use it.

use std::fmt::Write as _;

use crate::relay::FetchedMessage;

/// Messages read before the one being translated.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextMessage {
    pub author: String,
    pub content: String,
    pub has_attachments: bool,
    pub has_stickers: bool,
}

impl ContextMessage {
    fn is_blank(&self) -> bool {
        self.content.trim().is_empty() && !self.has_attachments && !self.has_stickers
    }

    fn write_blocks(&self, out: &mut String) {
        if !self.content.trim().is_empty() {
            let _ = writeln!(out, "\"\"\"\n{}\n\"\"\"", self.content.trim());
        }
        if self.has_stickers {
            out.push_str("\"\"\"sticker\"\"\"\n");
        }
        if self.has_attachments {
            out.push_str("\"\"\"attachment\"\"\"\n");
        }
    }
}

impl From<&FetchedMessage> for ContextMessage {
    fn from(m: &FetchedMessage) -> Self {
        Self {
            author: m.author.display_name.clone(),
            content: m.content.clone(),
            has_attachments: m.has_attachments,
            has_stickers: m.has_stickers,
        }
    }
}

/// Who is writing, what they reply to and what was said before, oldest
/// first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TranslationContext {
    pub author: String,
    pub replying_to: Option<ContextMessage>,
    pub history: Vec<ContextMessage>,
}

impl TranslationContext {
    /// `recent` is newest first, as the chat platform returns it.
    pub fn new(
        author: impl Into<String>,
        replying_to: Option<&FetchedMessage>,
        recent: &[FetchedMessage],
    ) -> Self {
        let history = recent
            .iter()
            .rev()
            .map(ContextMessage::from)
            .filter(|m| !m.is_blank())
            .collect();
        Self {
            author: author.into(),
            replying_to: replying_to.map(ContextMessage::from).filter(|m| !m.is_blank()),
            history,
        }
    }

    /// Plain-text rendering for prompts. Consecutive messages by the same
    /// author share one name line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "User: {}", self.author);

        if let Some(reply) = &self.replying_to {
            out.push_str("\nReplying to:\n");
            let _ = writeln!(out, "{}:", reply.author);
            reply.write_blocks(&mut out);
        }

        if !self.history.is_empty() {
            out.push_str("\nChat history:\n");
            let mut last_author: Option<&str> = None;
            for message in &self.history {
                if last_author != Some(message.author.as_str()) {
                    let _ = writeln!(out, "{}:", message.author);
                    last_author = Some(message.author.as_str());
                }
                message.write_blocks(&mut out);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ChannelId, MessageId, MessageRef},
        testing::fetched,
    };

    fn said(id: u64, author: &str, content: &str) -> FetchedMessage {
        let mut m = fetched(MessageRef::new(ChannelId(1), MessageId(id)), content);
        m.author.display_name = author.to_string();
        m
    }

    #[test]
    fn history_is_oldest_first_and_grouped_by_author() {
        let mut photo = said(3, "bob", "");
        photo.has_attachments = true;
        let recent = [photo, said(2, "bob", "look"), said(1, "ana", "hi")];

        let context = TranslationContext::new("ana", None, &recent);
        assert_eq!(
            context.render(),
            "User: ana\n\nChat history:\nana:\n\"\"\"\nhi\n\"\"\"\nbob:\n\"\"\"\nlook\n\"\"\"\n\"\"\"attachment\"\"\"\n"
        );
    }

    #[test]
    fn reply_target_is_rendered_before_history() {
        let target = said(5, "bob", "did the build pass?");
        let context = TranslationContext::new("ana", Some(&target), &[]);

        let rendered = context.render();
        assert!(rendered.starts_with("User: ana\n\nReplying to:\nbob:\n"));
        assert!(rendered.contains("did the build pass?"));
        assert!(!rendered.contains("Chat history"));
    }

    #[test]
    fn blank_messages_are_dropped() {
        let recent = [said(2, "bob", "  "), said(1, "bob", "ok")];
        let context = TranslationContext::new("ana", Some(&said(9, "bob", "")), &recent);
        assert_eq!(context.history.len(), 1);
        assert!(context.replying_to.is_none());
    }
}
