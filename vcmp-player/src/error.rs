//! Error types for vcmp-player
//!
//! Playback failures carry the taxonomy the orchestrator recovers from;
//! everything else follows the usual module error layout.

use thiserror::Error;

use crate::transport::TransportError;

/// Main error type for vcmp-player
#[derive(Error, Debug)]
pub enum Error {
    /// Media resolver could not produce a playable file
    #[error("Media unavailable: {0}")]
    MediaUnavailable(String),

    /// Transport found no active voice call in the chat
    #[error("No active voice call")]
    TransportNoActiveCall,

    /// Transport found no audio source in the stream
    #[error("No audio source found in stream")]
    TransportNoAudioSource,

    /// Transport or voice-call backend failed
    #[error("Transport server error: {0}")]
    TransportServerError(String),

    /// Resolved file vanished before the transport opened it
    #[error("Media file missing: {0}")]
    TransportFileMissing(String),

    /// Transport cannot report a position to seek from
    #[error("Seek unavailable: nothing is streaming")]
    SeekUnavailable,

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Shared library errors
    #[error(transparent)]
    Common(#[from] vcmp_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Messaging platform errors
    #[error("Messaging error: {0}")]
    Messaging(String),

    /// Queue management errors
    #[error("Queue error: {0}")]
    Queue(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::FileMissing(path) => Error::TransportFileMissing(path),
            TransportError::NoActiveCall => Error::TransportNoActiveCall,
            TransportError::NoAudioSource => Error::TransportNoAudioSource,
            TransportError::Server(msg) => Error::TransportServerError(msg),
        }
    }
}

/// Convenience Result type using vcmp-player Error
pub type Result<T> = std::result::Result<T, Error>;
