use std::sync::Arc;

use chrono::Utc;

use crate::{
    domain::{MessageId, MessageRef, UserId},
    model::{MessageLink, MessageLinkItem},
    store::MessageLinkStore,
    Result,
};

/// Records which relayed copies belong to which authored message.
pub struct MessageLedger {
    store: Arc<dyn MessageLinkStore>,
}

impl MessageLedger {
    pub fn new(store: Arc<dyn MessageLinkStore>) -> Self {
        Self { store }
    }

    /// Writes one entry per origin message; a second call for the same origin
    /// returns the entry already stored.
    pub async fn record(
        &self,
        author_id: UserId,
        origin: MessageRef,
        copies: &[MessageRef],
    ) -> Result<MessageLink> {
        let mut links = Vec::with_capacity(copies.len() + 1);
        links.push(MessageLinkItem::from(origin));
        links.extend(copies.iter().copied().map(MessageLinkItem::from));

        let entry = MessageLink {
            author_id,
            message_id: origin.message_id,
            channel_id: origin.channel_id,
            links,
            created_at: Utc::now(),
        };

        if self.store.insert_message_link(&entry).await? {
            return Ok(entry);
        }
        Ok(self
            .store
            .find_message_link_by_origin(origin.message_id)
            .await?
            .unwrap_or(entry))
    }

    pub async fn find_by_origin(&self, message_id: MessageId) -> Result<Option<MessageLink>> {
        self.store.find_message_link_by_origin(message_id).await
    }

    /// Entry listing `message_id` as origin or as a relayed copy.
    pub async fn find_by_participant(&self, message_id: MessageId) -> Result<Option<MessageLink>> {
        self.store.find_message_link_by_participant(message_id).await
    }

    pub async fn delete_by_origin(&self, origin: MessageId) -> Result<bool> {
        self.store.delete_message_link(origin).await
    }
}
