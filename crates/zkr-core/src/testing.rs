//! Hand-written fakes shared by the unit tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    config::{DISCORD_ATTACHMENT_LIMIT, DISCORD_MESSAGE_LIMIT},
    crypto::CredentialCipher,
    domain::{ChannelId, MessageId, MessageRef, UserId},
    errors::Error,
    languages::Language,
    relay::{
        Author, FetchedMessage, OutgoingMessage, ReactionEmoji, RelayLimits, RelayPort,
    },
    translation::{ProviderFactory, ProviderKind, TranslationContext, TranslationProvider, Usage},
    Result,
};

pub const BOT_ID: UserId = UserId(1);

pub fn test_cipher() -> CredentialCipher {
    CredentialCipher::new([42; 32])
}

pub fn fetched(message: MessageRef, content: &str) -> FetchedMessage {
    FetchedMessage {
        message,
        url: format!(
            "https://discord.com/channels/0/{}/{}",
            message.channel_id, message.message_id
        ),
        content: content.to_string(),
        author: Author {
            id: UserId(7),
            display_name: "ana".into(),
            avatar_url: Some("https://cdn.example/ana.png".into()),
            is_bot: false,
        },
        is_relay: false,
        has_attachments: false,
        has_stickers: false,
    }
}

// ============== Translation ==============

/// Prefixes the text with `[<target code>]`.
pub struct FakeProvider {
    kind: ProviderKind,
    reject: bool,
    contextual: bool,
    unsupported: Vec<&'static str>,
    failures: Mutex<VecDeque<Error>>,
    calls: Mutex<Vec<(String, &'static str, &'static str)>>,
    contexts: Mutex<Vec<TranslationContext>>,
}

impl FakeProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            reject: false,
            contextual: false,
            unsupported: Vec::new(),
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Reads conversation context, like the chat-completions provider.
    pub fn contextual(mut self) -> Self {
        self.contextual = true;
        self
    }

    pub fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }

    pub fn unsupported(mut self, target: &'static str) -> Self {
        self.unsupported.push(target);
        self
    }

    /// The next call fails with `err`.
    pub fn fail_next(&self, err: Error) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn calls(&self) -> Vec<(String, &'static str, &'static str)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn contexts(&self) -> Vec<TranslationContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranslationProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn translate(
        &self,
        text: &str,
        source: &'static Language,
        target: &'static Language,
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), source.code, target.code));

        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if self.reject {
            return Err(Error::Authorization(vec![self.kind]));
        }
        if self.unsupported.contains(&target.code) {
            return Err(Error::Translation(format!("{} not supported", target.code)));
        }
        Ok(format!("[{}] {text}", target.code))
    }

    fn uses_context(&self) -> bool {
        self.contextual
    }

    async fn translate_in_context(
        &self,
        text: &str,
        source: &'static Language,
        target: &'static Language,
        context: &TranslationContext,
    ) -> Result<String> {
        self.contexts.lock().unwrap().push(context.clone());
        self.translate(text, source, target).await
    }

    async fn validate(&self) -> Result<()> {
        if self.reject {
            return Err(Error::Authorization(vec![self.kind]));
        }
        Ok(())
    }

    async fn usage(&self) -> Result<Option<Usage>> {
        Ok(Some(Usage {
            count: 1_234,
            limit: 500_000,
        }))
    }
}

/// Keys starting with `bad` are rejected.
#[derive(Default)]
pub struct FakeFactory {
    built: Mutex<Vec<String>>,
    providers: Mutex<HashMap<String, Arc<FakeProvider>>>,
}

impl FakeFactory {
    pub fn built(&self) -> Vec<String> {
        self.built.lock().unwrap().clone()
    }

    /// The provider built for `key`.
    pub fn provider(&self, key: &str) -> Option<Arc<FakeProvider>> {
        self.providers.lock().unwrap().get(key).cloned()
    }
}

impl ProviderFactory for FakeFactory {
    fn build(&self, kind: ProviderKind, api_key: &str) -> Result<Arc<dyn TranslationProvider>> {
        self.built.lock().unwrap().push(api_key.to_string());
        let mut provider = FakeProvider::new(kind);
        if kind == ProviderKind::OpenAi {
            provider = provider.contextual();
        }
        if api_key.starts_with("bad") {
            provider = provider.rejecting();
        }
        let provider = Arc::new(provider);
        self.providers
            .lock()
            .unwrap()
            .insert(api_key.to_string(), provider.clone());
        Ok(provider)
    }
}

// ============== Relay ==============

#[derive(Default)]
pub struct FakeRelay {
    next_id: AtomicU64,
    emojis: Mutex<HashSet<u64>>,
    non_text: Mutex<HashSet<ChannelId>>,
    failing: Mutex<HashSet<ChannelId>>,
    failing_reactions: Mutex<bool>,
    messages: Mutex<HashMap<MessageId, FetchedMessage>>,
    sends: Mutex<Vec<(ChannelId, OutgoingMessage)>>,
    edits: Mutex<Vec<(MessageRef, String)>>,
    deletes: Mutex<Vec<MessageRef>>,
    added: Mutex<Vec<(MessageRef, ReactionEmoji)>>,
    removed: Mutex<Vec<(MessageRef, ReactionEmoji)>>,
    replies: Mutex<Vec<(MessageRef, String)>>,
}

impl FakeRelay {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            ..Self::default()
        }
    }

    pub fn put_message(&self, message: FetchedMessage) {
        self.messages
            .lock()
            .unwrap()
            .insert(message.message.message_id, message);
    }

    pub fn add_emoji(&self, id: u64) {
        self.emojis.lock().unwrap().insert(id);
    }

    pub fn set_non_text(&self, channel: ChannelId) {
        self.non_text.lock().unwrap().insert(channel);
    }

    /// Every write into `channel` fails.
    pub fn fail_channel(&self, channel: ChannelId) {
        self.failing.lock().unwrap().insert(channel);
    }

    pub fn fail_reactions(&self) {
        *self.failing_reactions.lock().unwrap() = true;
    }

    pub fn sends(&self) -> Vec<(ChannelId, OutgoingMessage)> {
        self.sends.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<(MessageRef, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<MessageRef> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn reactions_added(&self) -> Vec<(MessageRef, ReactionEmoji)> {
        self.added.lock().unwrap().clone()
    }

    pub fn reactions_removed(&self) -> Vec<(MessageRef, ReactionEmoji)> {
        self.removed.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<(MessageRef, String)> {
        self.replies.lock().unwrap().clone()
    }

    fn check(&self, channel: ChannelId) -> Result<()> {
        if self.failing.lock().unwrap().contains(&channel) {
            return Err(Error::Dispatch {
                channel: channel.0,
                reason: "missing access".into(),
            });
        }
        Ok(())
    }

    fn next_ref(&self, channel: ChannelId) -> MessageRef {
        MessageRef::new(channel, MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }
}

#[async_trait]
impl RelayPort for FakeRelay {
    fn limits(&self) -> RelayLimits {
        RelayLimits {
            message_chars: DISCORD_MESSAGE_LIMIT,
            attachment_bytes: DISCORD_ATTACHMENT_LIMIT,
        }
    }

    fn current_user_id(&self) -> UserId {
        BOT_ID
    }

    fn has_emoji(&self, emoji_id: u64) -> bool {
        self.emojis.lock().unwrap().contains(&emoji_id)
    }

    async fn is_text_channel(&self, channel: ChannelId) -> Result<bool> {
        Ok(!self.non_text.lock().unwrap().contains(&channel))
    }

    async fn send_as(&self, channel: ChannelId, message: OutgoingMessage) -> Result<MessageRef> {
        self.check(channel)?;
        self.sends.lock().unwrap().push((channel, message));
        Ok(self.next_ref(channel))
    }

    async fn edit_relayed(&self, message: MessageRef, content: &str) -> Result<()> {
        self.check(message.channel_id)?;
        self.edits
            .lock()
            .unwrap()
            .push((message, content.to_string()));
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> Result<()> {
        self.check(message.channel_id)?;
        self.deletes.lock().unwrap().push(message);
        Ok(())
    }

    async fn add_reaction(&self, message: MessageRef, emoji: &ReactionEmoji) -> Result<()> {
        if *self.failing_reactions.lock().unwrap() {
            return Err(Error::External("Unknown Emoji".into()));
        }
        self.added.lock().unwrap().push((message, emoji.clone()));
        Ok(())
    }

    async fn remove_own_reaction(&self, message: MessageRef, emoji: &ReactionEmoji) -> Result<()> {
        self.removed.lock().unwrap().push((message, emoji.clone()));
        Ok(())
    }

    async fn fetch_message(&self, message: MessageRef) -> Result<FetchedMessage> {
        self.messages
            .lock()
            .unwrap()
            .get(&message.message_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("message {}", message.message_id)))
    }

    async fn recent_messages(&self, before: MessageRef, limit: usize) -> Result<Vec<FetchedMessage>> {
        let mut found: Vec<FetchedMessage> = self
            .messages
            .lock()
            .unwrap()
            .values()
            .filter(|m| {
                m.message.channel_id == before.channel_id && m.message.message_id < before.message_id
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| b.message.message_id.cmp(&a.message.message_id));
        found.truncate(limit);
        Ok(found)
    }

    async fn reply(&self, to: MessageRef, content: &str) -> Result<MessageRef> {
        self.replies.lock().unwrap().push((to, content.to_string()));
        Ok(self.next_ref(to.channel_id))
    }
}
