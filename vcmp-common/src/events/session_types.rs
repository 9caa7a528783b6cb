//! Session-related type definitions
//!
//! Supporting types for per-chat playback sessions.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Error;

/// Loop mode of a chat
///
/// Governs what happens to the current track when playback advances.
/// Persisted as `normal`, `loop_all` or `loop_one`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Current track is dropped when playback advances
    #[default]
    Normal,
    /// Current track is re-appended to the tail before advancing
    LoopAll,
    /// Current track is replayed instead of advancing
    LoopOne,
}

impl LoopMode {
    /// Next mode in the settings cycle: Normal → LoopAll → LoopOne → Normal
    pub fn cycle(self) -> Self {
        match self {
            LoopMode::Normal => LoopMode::LoopAll,
            LoopMode::LoopAll => LoopMode::LoopOne,
            LoopMode::LoopOne => LoopMode::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Normal => "normal",
            LoopMode::LoopAll => "loop_all",
            LoopMode::LoopOne => "loop_one",
        }
    }
}

impl std::fmt::Display for LoopMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoopMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(LoopMode::Normal),
            "loop_all" => Ok(LoopMode::LoopAll),
            "loop_one" => Ok(LoopMode::LoopOne),
            other => Err(Error::InvalidSetting(format!("unknown loop mode {:?}", other))),
        }
    }
}

/// Playback phase of a chat session
///
/// `Idle → Starting → Playing ⇄ Paused → Idle`, with `Starting → Idle` on failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Starting,
    Playing,
    Paused,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Starting => write!(f, "starting"),
            SessionPhase::Playing => write!(f, "playing"),
            SessionPhase::Paused => write!(f, "paused"),
        }
    }
}

/// Why a voice call was closed underneath the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Assistant was removed from the chat
    Kicked,
    /// Assistant left the chat
    Left,
    /// The voice chat itself was ended
    VoiceChatClosed,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Kicked => write!(f, "kicked"),
            CloseReason::Left => write!(f, "left"),
            CloseReason::VoiceChatClosed => write!(f, "voice_chat_closed"),
        }
    }
}

/// Why a session was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Explicit user stop
    User,
    /// Queue ran out of tracks
    QueueExhausted,
    /// Transport or resolver failure with nothing to recover into
    Failure,
    /// Call closed by the platform
    CallClosed(CloseReason),
    /// Stale call found at process start
    Recovery,
}
