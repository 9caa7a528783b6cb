//! Voice-call transport seam
//!
//! The transport streams a local file into a chat's group call and reports
//! asynchronous updates (stream ended, call closed). One transport client
//! serves many chats; a chat is pinned to one client (its "assistant").

pub mod loopback;
pub mod pool;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use vcmp_common::events::CloseReason;
use vcmp_common::ChatId;

pub use loopback::LoopbackTransport;
pub use pool::TransportPool;

/// Failure reported by a transport call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// File could not be opened at playback time
    #[error("file missing: {0}")]
    FileMissing(String),

    /// The chat has no voice call to join
    #[error("no active group call")]
    NoActiveCall,

    /// The media carries no audio stream
    #[error("no audio source")]
    NoAudioSource,

    /// Backend/connection failure
    #[error("server error: {0}")]
    Server(String),
}

/// What the orchestrator does after a failed stream start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Notify, then move on to the next track
    SkipForward,
    /// Notify and tear the session down
    Stop,
}

impl TransportError {
    /// Recovery policy for this failure
    pub fn recovery(&self) -> Recovery {
        match self {
            TransportError::FileMissing(_) | TransportError::NoAudioSource => Recovery::SkipForward,
            TransportError::NoActiveCall | TransportError::Server(_) => Recovery::Stop,
        }
    }
}

/// Parameters of one stream start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Render a video track
    pub video: bool,
    /// Start offset in milliseconds
    pub seek_ms: u64,
    /// Track length, when known
    pub duration_ms: Option<u64>,
}

/// Asynchronous update emitted by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportUpdate {
    /// The audio stream in the chat reached its end
    StreamEnded { chat_id: ChatId },
    /// The call went away underneath the session
    ChatClosed { chat_id: ChatId, reason: CloseReason },
}

impl TransportUpdate {
    pub fn chat_id(&self) -> ChatId {
        match self {
            TransportUpdate::StreamEnded { chat_id } | TransportUpdate::ChatClosed { chat_id, .. } => {
                *chat_id
            }
        }
    }
}

/// One voice-call client
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Start (or restart) streaming `path` into the chat's call
    async fn start_stream(
        &self,
        chat_id: ChatId,
        path: &Path,
        options: StreamOptions,
    ) -> Result<(), TransportError>;

    /// Pause the stream; false if nothing was paused
    async fn pause(&self, chat_id: ChatId) -> Result<bool, TransportError>;

    /// Resume the stream; false if nothing was resumed
    async fn resume(&self, chat_id: ChatId) -> Result<bool, TransportError>;

    /// Current position in milliseconds, None if nothing is streaming
    async fn position(&self, chat_id: ChatId) -> Result<Option<u64>, TransportError>;

    /// Leave the call; `close = false` keeps the connection for a fast rejoin
    async fn leave_call(&self, chat_id: ChatId, close: bool) -> Result<(), TransportError>;

    /// Round-trip latency to the backend in milliseconds
    async fn ping(&self) -> f64;
}
