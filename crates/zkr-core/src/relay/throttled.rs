use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    config::Config,
    domain::{ChannelId, MessageRef, UserId},
    relay::{
        port::RelayPort,
        types::{FetchedMessage, OutgoingMessage, ReactionEmoji, RelayLimits},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two outbound calls.
    pub global_min_interval: Duration,
    /// Minimum spacing between calls touching the same channel.
    pub per_channel_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(20),
            per_channel_min_interval: Duration::from_millis(250),
        }
    }
}

impl From<&Config> for ThrottleConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            global_min_interval: cfg.relay_global_min_interval,
            per_channel_min_interval: cfg.relay_channel_min_interval,
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return how long to wait for it.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = self.next.max(now);
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// RelayPort decorator that spaces outbound calls.
///
/// A fan-out burst into one channel (a busy source with several edits and
/// reactions) is smoothed instead of running into Discord's 429s.
pub struct ThrottledRelay {
    inner: Arc<dyn RelayPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_channel: Mutex<HashMap<ChannelId, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledRelay {
    pub fn new(inner: Arc<dyn RelayPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_channel: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for(&self, channel: ChannelId) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_channel.lock().await;
        map.entry(channel)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_channel_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_channel(&self, channel: ChannelId) {
        let global_wait = { self.global.lock().await.reserve() };
        let channel_wait = {
            let limiter = self.limiter_for(channel).await;
            let mut guard = limiter.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(channel_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn throttle_global(&self) {
        let wait = { self.global.lock().await.reserve() };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait]
impl RelayPort for ThrottledRelay {
    fn limits(&self) -> RelayLimits {
        self.inner.limits()
    }

    fn current_user_id(&self) -> UserId {
        self.inner.current_user_id()
    }

    fn has_emoji(&self, emoji_id: u64) -> bool {
        self.inner.has_emoji(emoji_id)
    }

    async fn is_text_channel(&self, channel: ChannelId) -> Result<bool> {
        // Answered from the gateway cache once it is attached.
        self.inner.is_text_channel(channel).await
    }

    async fn send_as(&self, channel: ChannelId, message: OutgoingMessage) -> Result<MessageRef> {
        self.throttle_channel(channel).await;
        self.inner.send_as(channel, message).await
    }

    async fn edit_relayed(&self, message: MessageRef, content: &str) -> Result<()> {
        self.throttle_channel(message.channel_id).await;
        self.inner.edit_relayed(message, content).await
    }

    async fn delete_message(&self, message: MessageRef) -> Result<()> {
        self.throttle_channel(message.channel_id).await;
        self.inner.delete_message(message).await
    }

    async fn add_reaction(&self, message: MessageRef, emoji: &ReactionEmoji) -> Result<()> {
        self.throttle_channel(message.channel_id).await;
        self.inner.add_reaction(message, emoji).await
    }

    async fn remove_own_reaction(&self, message: MessageRef, emoji: &ReactionEmoji) -> Result<()> {
        self.throttle_channel(message.channel_id).await;
        self.inner.remove_own_reaction(message, emoji).await
    }

    async fn fetch_message(&self, message: MessageRef) -> Result<FetchedMessage> {
        self.throttle_global().await;
        self.inner.fetch_message(message).await
    }

    async fn recent_messages(&self, before: MessageRef, limit: usize) -> Result<Vec<FetchedMessage>> {
        self.throttle_global().await;
        self.inner.recent_messages(before, limit).await
    }

    async fn reply(&self, to: MessageRef, content: &str) -> Result<MessageRef> {
        self.throttle_channel(to.channel_id).await;
        self.inner.reply(to, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::MessageId, testing::FakeRelay};

    #[test]
    fn limiter_spaces_reservations() {
        let mut limiter = IntervalLimiter::new(Duration::from_millis(100));
        assert!(limiter.reserve().is_zero());
        let second = limiter.reserve();
        assert!(second > Duration::from_millis(50));
        assert!(second <= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn same_channel_calls_wait_for_their_slot() {
        let fake = Arc::new(FakeRelay::new());
        let relay = ThrottledRelay::new(
            fake.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(1),
                per_channel_min_interval: Duration::from_millis(500),
            },
        );
        let msg = MessageRef::new(ChannelId(1), MessageId(1));

        let started = Instant::now();
        relay.delete_message(msg).await.unwrap();
        relay.delete_message(msg).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(fake.deletes().len(), 2);
    }
}
