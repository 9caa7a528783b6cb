//! Transport update routing
//!
//! Transport clients report updates on one mpsc channel. The router hands
//! each chat's updates to a lane task owned by that chat, so one chat's
//! updates are handled in arrival order while other chats run in parallel.
//!
//! A lane exits after sitting idle for a while. The next update for that
//! chat opens a new lane, which waits for the old one to finish first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use vcmp_common::ChatId;

use super::orchestrator::PlaybackOrchestrator;
use crate::transport::TransportUpdate;

/// How long a lane waits for its chat's next update before exiting
pub const DEFAULT_LANE_IDLE: Duration = Duration::from_secs(60);

struct Lane {
    tx: mpsc::UnboundedSender<TransportUpdate>,
    task: JoinHandle<()>,
}

pub struct EventRouter {
    orchestrator: Arc<PlaybackOrchestrator>,
    lanes: HashMap<ChatId, Lane>,
    idle_timeout: Duration,
}

impl EventRouter {
    pub fn new(orchestrator: Arc<PlaybackOrchestrator>) -> Self {
        Self {
            orchestrator,
            lanes: HashMap::new(),
            idle_timeout: DEFAULT_LANE_IDLE,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Consume `updates` with a default router until every sender is gone
    pub fn spawn(
        orchestrator: Arc<PlaybackOrchestrator>,
        updates: mpsc::UnboundedReceiver<TransportUpdate>,
    ) -> JoinHandle<()> {
        EventRouter::new(orchestrator).run(updates)
    }

    pub fn run(mut self, mut updates: mpsc::UnboundedReceiver<TransportUpdate>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Transport event router started");
            while let Some(update) = updates.recv().await {
                self.dispatch(update);
            }
            info!("Transport event router stopped");
        })
    }

    /// Queue an update on its chat's lane, opening the lane if needed
    pub fn dispatch(&mut self, update: TransportUpdate) {
        let chat_id = update.chat_id();
        let update = match self.lanes.get(&chat_id) {
            Some(lane) => match lane.tx.send(update) {
                Ok(()) => return,
                Err(mpsc::error::SendError(update)) => update,
            },
            None => update,
        };

        let previous = self.lanes.remove(&chat_id).map(|lane| lane.task);
        self.lanes.retain(|_, lane| !lane.tx.is_closed());

        let lane = self.open_lane(chat_id, previous);
        // A fresh lane's receiver is alive until this sender is dropped
        let _ = lane.tx.send(update);
        self.lanes.insert(chat_id, lane);
        debug!("Event lane opened for chat {} ({} open)", chat_id, self.lanes.len());
    }

    fn open_lane(&self, chat_id: ChatId, previous: Option<JoinHandle<()>>) -> Lane {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = Arc::clone(&self.orchestrator);
        let idle_timeout = self.idle_timeout;

        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                // Updates the expired lane still holds go first
                let _ = previous.await;
            }
            loop {
                match tokio::time::timeout(idle_timeout, rx.recv()).await {
                    Ok(Some(update)) => orchestrator.handle_update(update).await,
                    Ok(None) => break,
                    Err(_) => {
                        rx.close();
                        while let Ok(update) = rx.try_recv() {
                            orchestrator.handle_update(update).await;
                        }
                        break;
                    }
                }
            }
            debug!("Event lane closed for chat {}", chat_id);
        });

        Lane { tx, task }
    }
}
