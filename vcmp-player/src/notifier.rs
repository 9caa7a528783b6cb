//! Chat messaging seam
//!
//! The orchestrator only ever sends, edits and deletes messages. The
//! binary's notifier has no messaging platform behind it; it publishes
//! every message on the event bus so SSE clients render the chat side.

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use vcmp_common::events::{MessageAction, VcmpEvent};
use vcmp_common::{ChatId, MessageId};

use crate::error::Result;
use crate::state::SharedState;

#[async_trait]
pub trait ChatNotifier: Send + Sync {
    /// Post a message, returning its id
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageId>;

    async fn edit_message(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<()>;

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()>;
}

/// Publishes chat messages as `ChatMessage` events
pub struct EventNotifier {
    state: Arc<SharedState>,
    next_id: AtomicI64,
}

impl EventNotifier {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self {
            state,
            next_id: AtomicI64::new(1),
        }
    }

    fn publish(&self, chat_id: ChatId, message_id: MessageId, action: MessageAction, text: Option<&str>) {
        self.state.broadcast_event(VcmpEvent::ChatMessage {
            chat_id,
            message_id,
            action,
            text: text.map(str::to_string),
            timestamp: chrono::Utc::now(),
        });
    }
}

#[async_trait]
impl ChatNotifier for EventNotifier {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageId> {
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.publish(chat_id, message_id, MessageAction::Sent, Some(text));
        Ok(message_id)
    }

    async fn edit_message(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<()> {
        self.publish(chat_id, message_id, MessageAction::Edited, Some(text));
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.publish(chat_id, message_id, MessageAction::Deleted, None);
        Ok(())
    }
}
