//! Per-chat session state
//!
//! In-process source of truth for whether a chat has an open stream. The
//! durable store only mirrors it.

use serde::Serialize;
use vcmp_common::events::{LoopMode, SessionPhase};

/// Transport/playback status of one chat
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    phase: SessionPhase,
    /// Cached from the store when the session was created
    pub loop_mode: LoopMode,
    /// Index of the assistant (transport client) serving the chat
    pub assistant: usize,
    /// When the current track last started as a new play
    pub track_started_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl SessionState {
    /// New session in the Starting phase
    pub fn starting(loop_mode: LoopMode, assistant: usize) -> Self {
        Self {
            phase: SessionPhase::Starting,
            loop_mode,
            assistant,
            track_started_at: None,
        }
    }

    /// A call/stream is open for the chat
    pub fn is_active(&self) -> bool {
        matches!(self.phase, SessionPhase::Playing | SessionPhase::Paused)
    }

    /// Meaningful only while active
    pub fn is_paused(&self) -> bool {
        self.phase == SessionPhase::Paused
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Move to `phase`, returning the previous phase
    pub fn transition(&mut self, phase: SessionPhase) -> SessionPhase {
        std::mem::replace(&mut self.phase, phase)
    }
}

/// Serializable view of a chat for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub active: bool,
    pub paused: bool,
    pub loop_mode: LoopMode,
    pub current_track_id: Option<String>,
    pub queue_length: usize,
}
