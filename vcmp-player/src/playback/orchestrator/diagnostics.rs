//! Status accessors, transport event handlers and startup recovery

use tracing::{debug, info, warn};
use vcmp_common::events::{CloseReason, StopReason};
use vcmp_common::ChatId;

use super::core::PlaybackOrchestrator;
use crate::error::Result;
use crate::playback::session::{SessionSnapshot, SessionState};
use crate::transport::TransportUpdate;

impl PlaybackOrchestrator {
    /// Copy of the chat's session, None while idle
    pub async fn session(&self, chat_id: ChatId) -> Option<SessionState> {
        self.lock_existing(chat_id).await?.session.clone()
    }

    pub async fn session_snapshot(&self, chat_id: ChatId) -> SessionSnapshot {
        let guard = self.lock_existing(chat_id).await;
        let slot = guard.as_deref();
        let session = slot.and_then(|s| s.session.as_ref());
        SessionSnapshot {
            phase: session.map(SessionState::phase).unwrap_or_default(),
            active: session.is_some_and(SessionState::is_active),
            paused: session.is_some_and(SessionState::is_paused),
            loop_mode: session.map(|s| s.loop_mode).unwrap_or_default(),
            current_track_id: slot.and_then(|s| s.current()).map(|t| t.id.clone()),
            queue_length: slot.map_or(0, |s| s.queue_len()),
        }
    }

    /// Chats with an active session, ascending
    pub fn active_chats(&self) -> Vec<ChatId> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .copied()
            .collect()
    }

    /// Mean transport latency in milliseconds
    pub async fn ping(&self) -> f64 {
        self.transports.ping().await
    }

    /// The chat's stream reached its end
    pub async fn on_stream_ended(&self, chat_id: ChatId) {
        debug!("Stream ended in chat {}", chat_id);
        match self.play_next(chat_id).await {
            Ok(outcome) => debug!("Chat {} after stream end: {:?}", chat_id, outcome),
            Err(e) => warn!("Advance after stream end failed in chat {}: {}", chat_id, e),
        }
    }

    /// The call went away underneath the session
    pub async fn on_call_closed(&self, chat_id: ChatId, reason: CloseReason) {
        info!("Call closed in chat {} ({})", chat_id, reason);
        let mut guard = self.lock_chat(chat_id).await;
        self.stop_locked(chat_id, &mut guard, StopReason::CallClosed(reason))
            .await;
        drop(guard);
        self.release_slot(chat_id).await;
    }

    /// Dispatch one transport update to its handler
    pub async fn handle_update(&self, update: TransportUpdate) {
        match update {
            TransportUpdate::StreamEnded { chat_id } => self.on_stream_ended(chat_id).await,
            TransportUpdate::ChatClosed { chat_id, reason } => {
                self.on_call_closed(chat_id, reason).await
            }
        }
    }

    /// Tear down calls the store still marks active from a previous run
    ///
    /// Queues do not survive a restart, so such calls have nothing to play.
    /// Returns the number of chats cleaned up.
    pub async fn recover_stale_calls(&self) -> Result<usize> {
        let stale = self.store.active_chats().await?;
        let mut recovered = 0;

        for chat_id in stale {
            let mut guard = self.lock_chat(chat_id).await;
            if guard.is_active() {
                continue;
            }
            info!("Recovering stale call in chat {}", chat_id);
            self.stop_locked(chat_id, &mut guard, StopReason::Recovery).await;
            drop(guard);
            self.release_slot(chat_id).await;
            recovered += 1;
        }

        if recovered > 0 {
            info!("Recovered {} stale call(s)", recovered);
        }
        Ok(recovered)
    }
}
