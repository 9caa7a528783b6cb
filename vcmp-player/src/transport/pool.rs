//! Assistant (transport client) pool
//!
//! Chats are pinned to one client. The first lookup picks a client at
//! random and persists the choice, so a chat keeps its assistant across
//! restarts.

use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use vcmp_common::ChatId;

use super::VoiceTransport;
use crate::db::SessionStore;
use crate::error::{Error, Result};

pub struct TransportPool {
    clients: Vec<Arc<dyn VoiceTransport>>,
    store: Arc<dyn SessionStore>,
    assigned: RwLock<HashMap<ChatId, usize>>,
}

impl TransportPool {
    pub fn new(clients: Vec<Arc<dyn VoiceTransport>>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            clients,
            store,
            assigned: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Client serving the chat, with its 1-based assistant number
    pub async fn client_for(&self, chat_id: ChatId) -> Result<(usize, Arc<dyn VoiceTransport>)> {
        let num = self.assistant_for(chat_id).await?;
        match self.clients.get(num - 1) {
            Some(client) => Ok((num, Arc::clone(client))),
            None => Err(Error::Internal(format!("assistant {} out of range", num))),
        }
    }

    /// 1-based assistant number for the chat, assigning one if needed
    pub async fn assistant_for(&self, chat_id: ChatId) -> Result<usize> {
        if self.clients.is_empty() {
            return Err(Error::Config("no transport clients configured".to_string()));
        }

        if let Some(num) = self.assigned.read().await.get(&chat_id) {
            return Ok(*num);
        }

        let mut assigned = self.assigned.write().await;
        if let Some(num) = assigned.get(&chat_id) {
            return Ok(*num);
        }

        let stored = match self.store.get_assistant(chat_id).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Failed to read assistant for chat {}: {}", chat_id, e);
                None
            }
        };

        let num = match stored {
            Some(num) if (1..=self.clients.len()).contains(&num) => num,
            _ => {
                let num = rand::thread_rng().gen_range(1..=self.clients.len());
                if let Err(e) = self.store.set_assistant(chat_id, num).await {
                    warn!("Failed to persist assistant for chat {}: {}", chat_id, e);
                }
                info!("Assigned assistant {} to chat {}", num, chat_id);
                num
            }
        };

        assigned.insert(chat_id, num);
        Ok(num)
    }

    /// Mean round-trip latency over all clients, in milliseconds
    pub async fn ping(&self) -> f64 {
        if self.clients.is_empty() {
            return 0.0;
        }
        let mut total = 0.0;
        for client in &self.clients {
            total += client.ping().await;
        }
        let mean = total / self.clients.len() as f64;
        (mean * 100.0).round() / 100.0
    }
}
