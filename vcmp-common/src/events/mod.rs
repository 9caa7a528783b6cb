//! Event types for the VCMP event system
//!
//! Provides shared event definitions and the EventBus used by the player
//! and its HTTP/SSE surface.

mod queue_types;
mod session_types;

pub use queue_types::{MessageAction, QueueChangeTrigger};
pub use session_types::{CloseReason, LoopMode, SessionPhase, StopReason};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{ChatId, MessageId};

/// VCMP event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// Every event is scoped to one chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VcmpEvent {
    /// Session phase changed (Idle/Starting/Playing/Paused)
    SessionStateChanged {
        chat_id: ChatId,
        old_phase: SessionPhase,
        new_phase: SessionPhase,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track started streaming as a new play (not a seek)
    ///
    /// Triggers:
    /// - Statistics: one play recorded
    /// - SSE: "now playing" update
    TrackStarted {
        chat_id: ChatId,
        track_id: String,
        title: String,
        requested_by: String,
        is_video: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Current track was restarted at an offset (seek)
    TrackRepositioned {
        chat_id: ChatId,
        track_id: String,
        position_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback of a track failed and the session recovered
    PlaybackFailed {
        chat_id: ChatId,
        track_id: String,
        /// Human-readable failure
        error: String,
        /// `skip` or `stop`
        recovery: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue contents changed
    QueueChanged {
        chat_id: ChatId,
        /// Number of tracks after the change (head included)
        length: usize,
        trigger: QueueChangeTrigger,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Loop mode changed
    LoopModeChanged {
        chat_id: ChatId,
        mode: LoopMode,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session torn down
    SessionStopped {
        chat_id: ChatId,
        reason: StopReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Message sent, edited or deleted on behalf of the player
    ChatMessage {
        chat_id: ChatId,
        message_id: MessageId,
        action: MessageAction,
        /// Message text (None for deletions)
        text: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl VcmpEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            VcmpEvent::SessionStateChanged { .. } => "SessionStateChanged",
            VcmpEvent::TrackStarted { .. } => "TrackStarted",
            VcmpEvent::TrackRepositioned { .. } => "TrackRepositioned",
            VcmpEvent::PlaybackFailed { .. } => "PlaybackFailed",
            VcmpEvent::QueueChanged { .. } => "QueueChanged",
            VcmpEvent::LoopModeChanged { .. } => "LoopModeChanged",
            VcmpEvent::SessionStopped { .. } => "SessionStopped",
            VcmpEvent::ChatMessage { .. } => "ChatMessage",
        }
    }

    /// Chat the event belongs to
    pub fn chat_id(&self) -> ChatId {
        match self {
            VcmpEvent::SessionStateChanged { chat_id, .. }
            | VcmpEvent::TrackStarted { chat_id, .. }
            | VcmpEvent::TrackRepositioned { chat_id, .. }
            | VcmpEvent::PlaybackFailed { chat_id, .. }
            | VcmpEvent::QueueChanged { chat_id, .. }
            | VcmpEvent::LoopModeChanged { chat_id, .. }
            | VcmpEvent::SessionStopped { chat_id, .. }
            | VcmpEvent::ChatMessage { chat_id, .. } => *chat_id,
        }
    }
}

/// One-to-many broadcaster for VcmpEvent
///
/// Thin wrapper over `tokio::sync::broadcast`. Slow subscribers lag and
/// lose the oldest events; emitters never block.
pub struct EventBus {
    tx: broadcast::Sender<VcmpEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use vcmp_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<VcmpEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: VcmpEvent,
    ) -> Result<usize, broadcast::error::SendError<VcmpEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: VcmpEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
