//! User commands - play, skip, replay, pause, resume, seek, stop

use tracing::{debug, info, warn};
use vcmp_common::events::{LoopMode, QueueChangeTrigger, SessionPhase, StopReason, VcmpEvent};
use vcmp_common::ChatId;

use super::core::{AdvanceCause, ChatGuard, ChatSlot, PlayOutcome, PlaybackOrchestrator, StartMode, Step};
use crate::error::{Error, Result};
use crate::playback::messages;
use crate::playback::queue::{ChatQueue, Enqueued};
use crate::playback::track::Track;

/// Absolute seek target: `position + delta`, clamped at zero
pub fn seek_target(position_ms: u64, delta_seconds: i64) -> u64 {
    let target = i128::from(position_ms) + i128::from(delta_seconds) * 1000;
    target.clamp(0, i128::from(u64::MAX)) as u64
}

impl PlaybackOrchestrator {
    /// (Re)start the chat's current track
    ///
    /// `track` must be the current track, or the chat's queue must be
    /// empty (the track then becomes current). A non-zero `seek_seconds`
    /// repositions the running playback instead of starting a new play.
    ///
    /// Returns `Error::MediaUnavailable` when the track cannot be resolved;
    /// the queue is left as it was and the chat stays idle.
    pub async fn play_media(
        &self,
        chat_id: ChatId,
        track: Track,
        seek_seconds: u64,
    ) -> Result<PlayOutcome> {
        let track_id = track.id.clone();
        let mut guard = self.lock_chat(chat_id).await;
        let queue = guard.queue.get_or_insert_with(ChatQueue::new);

        let added = match queue.current_mut() {
            None => {
                queue.add(track);
                let length = queue.len();
                self.emit_queue_changed(chat_id, length, QueueChangeTrigger::UserEnqueue);
                true
            }
            Some(head) if head.id == track.id => {
                if head.local_path.is_none() {
                    head.local_path = track.local_path;
                }
                false
            }
            Some(head) => {
                return Err(Error::InvalidState(format!(
                    "{} is not the current track of chat {} (current: {})",
                    track.id, chat_id, head.id
                )));
            }
        };

        let mode = if seek_seconds == 0 {
            StartMode::Fresh
        } else {
            StartMode::Reposition {
                seek_ms: vcmp_common::time::secs_to_millis(seek_seconds),
            }
        };
        let result = self.drive(chat_id, guard, Step::Start(mode)).await;
        if added && matches!(result, Err(Error::MediaUnavailable(_))) {
            // Take back only what this call queued
            let _ = self.drop_failed_head(chat_id, Some(track_id)).await;
        }
        self.release_slot(chat_id).await;
        result
    }

    /// Advance to the next track (skip / stream end)
    ///
    /// No-op for a chat without an active session.
    pub async fn play_next(&self, chat_id: ChatId) -> Result<PlayOutcome> {
        let Some(guard) = self.lock_existing(chat_id).await.filter(|g| g.is_active()) else {
            debug!("play_next ignored: chat {} is not active", chat_id);
            return Ok(PlayOutcome::Inactive);
        };
        let result = self
            .drive(chat_id, guard, Step::Advance(AdvanceCause::Finished))
            .await;
        self.release_slot(chat_id).await;
        result
    }

    /// Restart the current track from the beginning as a new play
    pub async fn replay(&self, chat_id: ChatId) -> Result<PlayOutcome> {
        let Some(mut guard) = self.lock_existing(chat_id).await.filter(|g| g.is_active()) else {
            return Ok(PlayOutcome::Inactive);
        };

        let old_message = guard
            .queue
            .as_mut()
            .and_then(ChatQueue::current_mut)
            .and_then(|t| t.ui_message_id.take());
        if let Some(id) = old_message {
            if let Err(e) = self.notifier.delete_message(chat_id, id).await {
                debug!("Failed to delete message {} in chat {}: {}", id, chat_id, e);
            }
        }

        info!("Replay requested for chat {}", chat_id);
        let result = self.drive(chat_id, guard, Step::Start(StartMode::Fresh)).await;
        self.release_slot(chat_id).await;
        result
    }

    /// Pause the stream; false if the chat is inactive or the transport
    /// had nothing to pause
    pub async fn pause(&self, chat_id: ChatId) -> Result<bool> {
        self.set_paused(chat_id, true).await
    }

    /// Resume the stream; false if the chat is inactive or the transport
    /// had nothing to resume
    pub async fn resume(&self, chat_id: ChatId) -> Result<bool> {
        self.set_paused(chat_id, false).await
    }

    async fn set_paused(&self, chat_id: ChatId, paused: bool) -> Result<bool> {
        let Some(mut guard) = self.lock_existing(chat_id).await.filter(|g| g.is_active()) else {
            return Ok(false);
        };

        let (_, client) = self.transports.client_for(chat_id).await?;
        let changed = if paused {
            client.pause(chat_id).await?
        } else {
            client.resume(chat_id).await?
        };
        if !changed {
            debug!("Transport reported no change (paused={}) for chat {}", paused, chat_id);
            return Ok(false);
        }

        let new_phase = if paused {
            SessionPhase::Paused
        } else {
            SessionPhase::Playing
        };
        if let Some(session) = guard.session.as_mut() {
            let old_phase = session.transition(new_phase);
            if old_phase != new_phase {
                self.emit_phase(chat_id, old_phase, new_phase);
            }
        }

        if let Err(e) = self.store.set_paused_flag(chat_id, paused).await {
            warn!("Failed to persist pause state for chat {}: {}", chat_id, e);
        }
        info!("Chat {} {}", chat_id, if paused { "paused" } else { "resumed" });
        Ok(true)
    }

    /// Move the playback position by `delta_seconds`
    ///
    /// Returns the absolute position the stream restarted at,
    /// `Error::SeekUnavailable` when no position can be read, or
    /// `Error::InvalidState` when the restart failed and the session ended.
    pub async fn seek(&self, chat_id: ChatId, delta_seconds: i64) -> Result<u64> {
        let Some(guard) = self.lock_existing(chat_id).await.filter(|g| g.is_active()) else {
            return Err(Error::SeekUnavailable);
        };

        let (_, client) = self.transports.client_for(chat_id).await?;
        let position = match client.position(chat_id).await {
            Ok(Some(position)) => position,
            Ok(None) => return Err(Error::SeekUnavailable),
            Err(e) => {
                debug!("Position unavailable for chat {}: {}", chat_id, e);
                return Err(Error::SeekUnavailable);
            }
        };

        let target = seek_target(position, delta_seconds);
        debug!(
            "Seek in chat {}: {}ms {:+}s -> {}ms",
            chat_id, position, delta_seconds, target
        );
        let outcome = self
            .drive(chat_id, guard, Step::Start(StartMode::Reposition { seek_ms: target }))
            .await;
        self.release_slot(chat_id).await;

        match outcome? {
            PlayOutcome::Playing => Ok(target),
            other => Err(Error::InvalidState(format!(
                "seek in chat {} ended {:?}, not playing",
                chat_id, other
            ))),
        }
    }

    /// Tear the session down; always leaves the chat idle
    pub async fn stop(&self, chat_id: ChatId) -> Result<()> {
        let mut guard = self.lock_chat(chat_id).await;
        self.stop_locked(chat_id, &mut guard, StopReason::User).await;
        drop(guard);
        self.release_slot(chat_id).await;
        Ok(())
    }

    // ========================================================================
    // Enqueue-and-play conveniences
    // ========================================================================

    /// Append a track; starts playback when the chat is idle
    ///
    /// When a session already runs, a "queued" notice is posted and becomes
    /// the track's UI message.
    pub async fn play(&self, chat_id: ChatId, track: Track) -> Result<Enqueued> {
        let mut guard = self.lock_chat(chat_id).await;
        let queue = guard.queue.get_or_insert_with(ChatQueue::new);
        let enqueued = queue.add(track);
        let length = queue.len();
        self.emit_queue_changed(chat_id, length, QueueChangeTrigger::UserEnqueue);

        let has_session = guard.session.is_some();
        if let (true, Enqueued::QueuedAt(position)) = (has_session, enqueued) {
            self.post_queued_notice(chat_id, &mut guard, position).await;
            return Ok(enqueued);
        }

        self.start_idle(chat_id, guard).await?;
        Ok(enqueued)
    }

    /// Append several tracks (a playlist); the first may start playback
    pub async fn enqueue_many(&self, chat_id: ChatId, tracks: Vec<Track>) -> Result<Vec<Enqueued>> {
        if tracks.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = self.lock_chat(chat_id).await;
        let queue = guard.queue.get_or_insert_with(ChatQueue::new);
        let results: Vec<Enqueued> = tracks.into_iter().map(|t| queue.add(t)).collect();
        let length = queue.len();
        self.emit_queue_changed(chat_id, length, QueueChangeTrigger::UserEnqueue);
        info!("Chat {}: {} tracks enqueued", chat_id, results.len());

        if guard.session.is_some() {
            self.notify(chat_id, &format!("Added {} tracks to the queue.", results.len()))
                .await;
            return Ok(results);
        }

        self.start_idle(chat_id, guard).await?;
        Ok(results)
    }

    /// Make `track` current right away, ahead of the queue
    pub async fn force_play(&self, chat_id: ChatId, track: Track) -> Result<PlayOutcome> {
        let mut guard = self.lock_chat(chat_id).await;
        let queue = guard.queue.get_or_insert_with(ChatQueue::new);
        let index = queue.force_add(track, None);
        let length = queue.len();
        self.emit_queue_changed(chat_id, length, QueueChangeTrigger::ForceEnqueue);

        if index == 0 {
            return self.start_idle(chat_id, guard).await;
        }
        let result = self
            .drive(chat_id, guard, Step::Advance(AdvanceCause::Forced))
            .await;
        self.release_slot(chat_id).await;
        result
    }

    /// Promote a queued track to current
    ///
    /// Returns false when the chat is inactive or the track is no longer
    /// queued. A track that is already current is left playing.
    pub async fn play_queued_now(&self, chat_id: ChatId, track_id: &str) -> Result<bool> {
        let Some(mut guard) = self.lock_existing(chat_id).await.filter(|g| g.is_active()) else {
            return Ok(false);
        };
        let Some(queue) = guard.queue.as_mut() else {
            return Ok(false);
        };
        let Some((position, track)) = queue.check_item(track_id).map(|(p, t)| (p, t.clone())) else {
            debug!("Track {} expired from chat {} queue", track_id, chat_id);
            return Ok(false);
        };
        if position == 0 {
            return Ok(true);
        }

        queue.force_add(track, Some(position));
        let length = queue.len();
        self.emit_queue_changed(chat_id, length, QueueChangeTrigger::ForceEnqueue);
        let result = self
            .drive(chat_id, guard, Step::Advance(AdvanceCause::Forced))
            .await;
        self.release_slot(chat_id).await;
        result.map(|_| true)
    }

    /// Start an idle chat on its queue, dropping heads that cannot be fetched
    ///
    /// `drive` leaves an unresolvable head queued; the enqueue-and-play
    /// commands move past it so the rest of what was just queued still
    /// plays. Gives up with `MediaUnavailable` once nothing is left.
    async fn start_idle(&self, chat_id: ChatId, mut guard: ChatGuard) -> Result<PlayOutcome> {
        let result = loop {
            let head = guard.current().map(|t| t.id.clone());
            let err = match self.drive(chat_id, guard, Step::Start(StartMode::Fresh)).await {
                Err(err @ Error::MediaUnavailable(_)) => err,
                other => break other,
            };

            match self.drop_failed_head(chat_id, head).await {
                Some(next) => guard = next,
                None => break Err(err),
            }
            debug!("Chat {} moving past unavailable head", chat_id);
        };
        self.release_slot(chat_id).await;
        result
    }

    /// Drop `head` after its start failed, if it still heads an idle chat
    ///
    /// Hands the lock back when another track follows it.
    async fn drop_failed_head(&self, chat_id: ChatId, head: Option<String>) -> Option<ChatGuard> {
        let mut guard = self.lock_chat(chat_id).await;
        let same_head = head.is_some() && guard.current().map(|t| &t.id) == head.as_ref();
        if guard.session.is_some() || !same_head {
            return None;
        }
        if self.discard_head(chat_id, &mut guard).await {
            Some(guard)
        } else {
            None
        }
    }

    async fn post_queued_notice(&self, chat_id: ChatId, guard: &mut ChatGuard, position: usize) {
        let Some(track) = guard.queue.as_mut().and_then(|q| q.get_mut(position)) else {
            return;
        };
        let text = messages::queued(track, position);
        match self.notifier.send_message(chat_id, &text).await {
            Ok(id) => track.ui_message_id = Some(id),
            Err(e) => warn!("Failed to post queued notice in chat {}: {}", chat_id, e),
        }
    }

    // ========================================================================
    // Loop mode
    // ========================================================================

    pub async fn loop_mode(&self, chat_id: ChatId) -> Result<LoopMode> {
        let guard = self.lock_existing(chat_id).await;
        match guard.as_ref().and_then(|g| g.session.as_ref()) {
            Some(session) => Ok(session.loop_mode),
            None => self.store.get_loop_mode(chat_id).await,
        }
    }

    pub async fn set_loop_mode(&self, chat_id: ChatId, mode: LoopMode) -> Result<()> {
        let mut guard = self.lock_existing(chat_id).await;
        self.apply_loop_mode(chat_id, guard.as_deref_mut(), mode).await
    }

    /// Normal → LoopAll → LoopOne → Normal; returns the new mode
    pub async fn cycle_loop_mode(&self, chat_id: ChatId) -> Result<LoopMode> {
        let mut guard = self.lock_existing(chat_id).await;
        let current = match guard.as_ref().and_then(|g| g.session.as_ref()) {
            Some(session) => session.loop_mode,
            None => self.store.get_loop_mode(chat_id).await?,
        };
        let next = current.cycle();
        self.apply_loop_mode(chat_id, guard.as_deref_mut(), next).await?;
        Ok(next)
    }

    /// Persist the mode; a live session picks it up at its next advance
    async fn apply_loop_mode(&self, chat_id: ChatId, slot: Option<&mut ChatSlot>, mode: LoopMode) -> Result<()> {
        self.store.set_loop_mode(chat_id, mode).await?;
        if let Some(session) = slot.and_then(|s| s.session.as_mut()) {
            session.loop_mode = mode;
        }
        self.state.broadcast_event(VcmpEvent::LoopModeChanged {
            chat_id,
            mode,
            timestamp: chrono::Utc::now(),
        });
        info!("Chat {} loop mode: {}", chat_id, mode);
        Ok(())
    }
}
