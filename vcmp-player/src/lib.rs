//! # VCMP Player Library (vcmp-player)
//!
//! Multi-tenant playback queue and session orchestrator for group voice
//! calls.
//!
//! **Purpose:** Keep one ordered queue per chat, drive a single stream per
//! chat through a voice-call transport, resolve media on demand, and keep
//! queue and transport consistent across user commands, transport events
//! and failures.
//!
//! **Architecture:** Per-chat serialized orchestrator over pluggable seams
//! (`transport`, `resolver`, `notifier`, `db::SessionStore`), with an
//! HTTP/SSE control surface.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod notifier;
pub mod playback;
pub mod resolver;
pub mod state;
pub mod transport;

pub use error::{Error, Result};
pub use state::SharedState;
