//! Playback queue and session orchestration

pub mod events;
pub mod messages;
pub mod orchestrator;
pub mod queue;
pub mod session;
pub mod track;

pub use events::EventRouter;
pub use orchestrator::{PlayOutcome, PlaybackOrchestrator, QueueSummary};
pub use queue::{ChatQueue, Enqueued};
pub use session::{SessionSnapshot, SessionState};
pub use track::{Track, TrackSource};
