//! Playback orchestrator
//!
//! **Module Structure:**
//! - `core.rs`: orchestrator struct, per-chat slots and the playback driver
//!   (resolve, start, advance, stop, failure recovery)
//! - `playback.rs`: user commands (play, skip, replay, pause, resume, seek,
//!   stop, force play, loop mode)
//! - `queue.rs`: queue operations exposed to command handlers
//! - `diagnostics.rs`: status accessors, transport event handlers, startup
//!   recovery

mod core;
mod diagnostics;
mod playback;
mod queue;

pub use self::core::{PlayOutcome, PlaybackOrchestrator};
pub use self::playback::seek_target;
pub use self::queue::QueueSummary;
