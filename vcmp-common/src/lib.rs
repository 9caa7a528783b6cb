//! # VCMP Common Library
//!
//! Shared code for the voice-call music player:
//! - Error type
//! - Event types (VcmpEvent enum) and the EventBus
//! - Configuration file and root folder resolution
//! - SQLite bootstrap (pool + schema)
//! - Human-readable duration formatting

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod human_time;
pub mod time;

pub use error::{Error, Result};

/// Chat (tenant) identifier as issued by the messaging platform
pub type ChatId = i64;

/// Identifier of a chat message owned by the messaging platform
pub type MessageId = i64;
