//! Queue type definitions
//!
//! Supporting types for queue change notifications.

use serde::{Deserialize, Serialize};

/// Why a chat queue changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum QueueChangeTrigger {
    /// Track appended to the tail
    UserEnqueue,
    /// Track inserted right after the current head
    ForceEnqueue,
    /// Head dequeued (stream ended, skip, failure)
    Advance,
    /// Upcoming tracks reordered
    Shuffle,
    /// Queue destroyed
    Cleared,
    /// Failed head discarded before playback started
    Discarded,
}

impl std::fmt::Display for QueueChangeTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueChangeTrigger::UserEnqueue => write!(f, "UserEnqueue"),
            QueueChangeTrigger::ForceEnqueue => write!(f, "ForceEnqueue"),
            QueueChangeTrigger::Advance => write!(f, "Advance"),
            QueueChangeTrigger::Shuffle => write!(f, "Shuffle"),
            QueueChangeTrigger::Cleared => write!(f, "Cleared"),
            QueueChangeTrigger::Discarded => write!(f, "Discarded"),
        }
    }
}

/// What happened to a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageAction {
    Sent,
    Edited,
    Deleted,
}
