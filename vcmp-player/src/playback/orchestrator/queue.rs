//! Queue operations - the per-chat queue as seen by command handlers
//!
//! Each call runs under the chat's lock. These only touch the queue; use
//! the playback commands to move the stream along with it.

use rand::Rng;
use serde::Serialize;
use tracing::debug;
use vcmp_common::events::QueueChangeTrigger;
use vcmp_common::human_time::format_clock;
use vcmp_common::ChatId;

use super::core::PlaybackOrchestrator;
use crate::playback::queue::{ChatQueue, Enqueued};
use crate::playback::track::Track;

/// Track count and length of a chat's queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    pub tracks: usize,
    pub total_seconds: u64,
    /// `total_seconds` as a clock string
    pub total_display: String,
}

impl PlaybackOrchestrator {
    /// Append to the tail without starting playback
    pub async fn add(&self, chat_id: ChatId, track: Track) -> Enqueued {
        let mut guard = self.lock_chat(chat_id).await;
        let queue = guard.queue.get_or_insert_with(ChatQueue::new);
        let enqueued = queue.add(track);
        let length = queue.len();
        self.emit_queue_changed(chat_id, length, QueueChangeTrigger::UserEnqueue);
        enqueued
    }

    /// Insert right after the current track; see [`ChatQueue::force_add`]
    pub async fn force_add(&self, chat_id: ChatId, track: Track, remove_at: Option<usize>) -> usize {
        let mut guard = self.lock_chat(chat_id).await;
        let queue = guard.queue.get_or_insert_with(ChatQueue::new);
        let index = queue.force_add(track, remove_at);
        let length = queue.len();
        self.emit_queue_changed(chat_id, length, QueueChangeTrigger::ForceEnqueue);
        index
    }

    pub async fn current(&self, chat_id: ChatId) -> Option<Track> {
        self.lock_existing(chat_id).await?.current().cloned()
    }

    /// Drop the current track and return the new one
    ///
    /// Moves the queue only; the transport keeps whatever it streams.
    pub async fn get_next(&self, chat_id: ChatId) -> Option<Track> {
        let mut guard = self.lock_existing(chat_id).await?;
        guard.generation += 1;
        let queue = guard.queue.as_mut()?;
        let next = queue.get_next().cloned();
        let length = queue.len();
        guard.drop_empty_queue();
        self.emit_queue_changed(chat_id, length, QueueChangeTrigger::Advance);
        drop(guard);
        self.release_slot(chat_id).await;
        next
    }

    /// Position and copy of a queued track, None once it has left the queue
    pub async fn check_item(&self, chat_id: ChatId, track_id: &str) -> Option<(usize, Track)> {
        let guard = self.lock_existing(chat_id).await?;
        guard
            .queue
            .as_ref()?
            .check_item(track_id)
            .map(|(position, track)| (position, track.clone()))
    }

    /// Reorder everything behind the current track
    pub async fn shuffle(&self, chat_id: ChatId) -> bool {
        let Some(mut guard) = self.lock_existing(chat_id).await else {
            return self.after_shuffle(chat_id, 0, false);
        };
        let shuffled = guard.queue.as_mut().is_some_and(ChatQueue::shuffle);
        self.after_shuffle(chat_id, guard.queue_len(), shuffled)
    }

    /// `shuffle` with a caller-supplied random source
    pub async fn shuffle_with<R: Rng + Send + ?Sized>(&self, chat_id: ChatId, rng: &mut R) -> bool {
        let Some(mut guard) = self.lock_existing(chat_id).await else {
            return self.after_shuffle(chat_id, 0, false);
        };
        let shuffled = guard.queue.as_mut().is_some_and(|q| q.shuffle_with(rng));
        self.after_shuffle(chat_id, guard.queue_len(), shuffled)
    }

    fn after_shuffle(&self, chat_id: ChatId, length: usize, shuffled: bool) -> bool {
        if shuffled {
            self.emit_queue_changed(chat_id, length, QueueChangeTrigger::Shuffle);
        } else {
            debug!("Shuffle skipped for chat {}: fewer than 3 tracks", chat_id);
        }
        shuffled
    }

    /// Destroy the queue; the session (if any) is left to `stop`
    pub async fn clear(&self, chat_id: ChatId) {
        let Some(mut guard) = self.lock_existing(chat_id).await else {
            return;
        };
        guard.generation += 1;
        if guard.queue.take().is_some() {
            self.emit_queue_changed(chat_id, 0, QueueChangeTrigger::Cleared);
        }
        drop(guard);
        self.release_slot(chat_id).await;
    }

    /// Copy of the queue in playback order
    pub async fn snapshot(&self, chat_id: ChatId) -> Vec<Track> {
        let guard = self.lock_existing(chat_id).await;
        guard
            .as_ref()
            .and_then(|g| g.queue.as_ref())
            .map(ChatQueue::snapshot)
            .unwrap_or_default()
    }

    pub async fn queue_summary(&self, chat_id: ChatId) -> QueueSummary {
        let guard = self.lock_existing(chat_id).await;
        let (tracks, total_seconds) = guard
            .as_ref()
            .and_then(|g| g.queue.as_ref())
            .map_or((0, 0), |q| (q.len(), q.total_duration_seconds()));
        QueueSummary {
            tracks,
            total_seconds,
            total_display: format_clock(total_seconds),
        }
    }
}
