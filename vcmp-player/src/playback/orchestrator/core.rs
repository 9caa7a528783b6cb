//! Core orchestrator - per-chat slots and the playback driver
//!
//! **Responsibilities:**
//! - PlaybackOrchestrator struct definition and construction
//! - Per-chat serialization (one async mutex per chat, no global lock)
//! - The drive loop: resolve the head, start the stream, recover from
//!   failures by skipping forward or stopping
//! - Teardown (`stop_locked`) shared by every path that ends a session

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};
use vcmp_common::events::{LoopMode, QueueChangeTrigger, SessionPhase, StopReason, VcmpEvent};
use vcmp_common::ChatId;

use crate::db::{PlayRecord, SessionStore};
use crate::error::{Error, Result};
use crate::notifier::ChatNotifier;
use crate::playback::messages;
use crate::playback::queue::ChatQueue;
use crate::playback::session::SessionState;
use crate::playback::track::{Track, TrackSource};
use crate::resolver::MediaResolver;
use crate::state::SharedState;
use crate::transport::{Recovery, StreamOptions, TransportError, TransportPool};

/// How a drive of the chat's playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayOutcome {
    /// A stream is running for the chat's current track
    Playing,
    /// The session was torn down (queue exhausted or unrecoverable failure)
    Stopped,
    /// A later command took over the chat while media was resolving
    Superseded,
    /// Nothing done: the chat has no active session
    Inactive,
}

/// Queue and session of one chat, guarded together
#[derive(Debug, Default)]
pub(super) struct ChatSlot {
    /// None once the queue is destroyed (stop/clear/exhaustion)
    pub(super) queue: Option<ChatQueue>,
    /// None while idle
    pub(super) session: Option<SessionState>,
    /// Bumped whenever the head or the session changes under a pending
    /// resolution; a resolution finishing against an old value is stale
    pub(super) generation: u64,
    /// Drives currently waiting on the resolver with the slot unlocked
    pub(super) resolving: usize,
}

impl ChatSlot {
    pub(super) fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(SessionState::is_active)
    }

    pub(super) fn queue_len(&self) -> usize {
        self.queue.as_ref().map_or(0, ChatQueue::len)
    }

    pub(super) fn current(&self) -> Option<&Track> {
        self.queue.as_ref().and_then(ChatQueue::current)
    }

    /// Nothing queued, no session, no pending resolution
    pub(super) fn is_idle(&self) -> bool {
        self.queue.is_none() && self.session.is_none() && self.resolving == 0
    }

    /// Destroy an emptied queue so "no queue" and "empty queue" stay one state
    pub(super) fn drop_empty_queue(&mut self) {
        if self.queue.as_ref().is_some_and(ChatQueue::is_empty) {
            self.queue = None;
        }
    }
}

pub(super) type ChatGuard = OwnedMutexGuard<ChatSlot>;

/// How the head is (re)started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StartMode {
    /// A new play: announced, counted in statistics
    Fresh,
    /// Same logical playback restarted at an offset
    Reposition { seek_ms: u64 },
}

/// Why the head is leaving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AdvanceCause {
    /// Stream ended or user skip; loop mode applies
    Finished,
    /// Head could not be played; dropped whatever the loop mode
    Failed,
    /// A promoted track waits at index 1; LoopOne does not hold the head
    Forced,
}

#[derive(Debug, Clone, Copy)]
pub(super) enum Step {
    Start(StartMode),
    Advance(AdvanceCause),
}

enum Resolution {
    Ready,
    Empty,
    Superseded,
    Failed(Error),
}

/// Playback orchestrator - owns every chat's queue and session
///
/// Commands and transport events for one chat run under that chat's slot
/// lock, in arrival order. Media resolution releases the lock while it
/// waits, so a slow download never blocks commands such as `stop`.
pub struct PlaybackOrchestrator {
    pub(super) slots: RwLock<HashMap<ChatId, Arc<Mutex<ChatSlot>>>>,

    /// Chats with an active session, for cheap listing
    pub(super) active: std::sync::Mutex<BTreeSet<ChatId>>,

    pub(super) transports: TransportPool,

    pub(super) resolver: Arc<dyn MediaResolver>,

    pub(super) store: Arc<dyn SessionStore>,

    pub(super) notifier: Arc<dyn ChatNotifier>,

    pub(super) state: Arc<SharedState>,
}

impl PlaybackOrchestrator {
    pub fn new(
        transports: TransportPool,
        resolver: Arc<dyn MediaResolver>,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn ChatNotifier>,
        state: Arc<SharedState>,
    ) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            active: std::sync::Mutex::new(BTreeSet::new()),
            transports,
            resolver,
            store,
            notifier,
            state,
        }
    }

    /// Slot of the chat, created on first use
    pub(super) async fn slot(&self, chat_id: ChatId) -> Arc<Mutex<ChatSlot>> {
        if let Some(slot) = self.slots.read().await.get(&chat_id) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(chat_id).or_default())
    }

    pub(super) async fn lock_chat(&self, chat_id: ChatId) -> ChatGuard {
        self.slot(chat_id).await.lock_owned().await
    }

    /// Lock the chat's slot only if it exists; never creates one
    pub(super) async fn lock_existing(&self, chat_id: ChatId) -> Option<ChatGuard> {
        let slot = self.slots.read().await.get(&chat_id).map(Arc::clone)?;
        Some(slot.lock_owned().await)
    }

    /// Forget the chat's slot once it is idle and nobody holds it
    ///
    /// Every guard and every pending resolution keeps a clone of the slot,
    /// so a strong count of one under the write lock means the map holds
    /// the only reference. Call with no guard of the chat alive.
    pub(super) async fn release_slot(&self, chat_id: ChatId) {
        let mut slots = self.slots.write().await;
        let Some(slot) = slots.get(&chat_id) else {
            return;
        };
        if Arc::strong_count(slot) > 1 {
            return;
        }
        let idle = slot.try_lock().is_ok_and(|s| s.is_idle());
        if idle {
            slots.remove(&chat_id);
            debug!("Released slot of chat {}", chat_id);
        }
    }

    /// Number of chats holding a queue, a session or a pending command
    pub async fn tracked_chats(&self) -> usize {
        self.slots.read().await.len()
    }

    pub(super) fn set_active_index(&self, chat_id: ChatId, active: bool) {
        let mut index = self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if active {
            index.insert(chat_id);
        } else {
            index.remove(&chat_id);
        }
    }

    // ========================================================================
    // Drive loop
    // ========================================================================

    /// Run playback steps for the chat until a stream is running or the
    /// session is gone
    ///
    /// Failures are recovered here: a bad file skips forward, a dead call
    /// stops. A resolution failure of the track being started (not one
    /// reached by advancing) is returned to the caller as
    /// `MediaUnavailable`; the queue keeps that track and the chat is left
    /// idle.
    pub(super) async fn drive(
        &self,
        chat_id: ChatId,
        mut guard: ChatGuard,
        first: Step,
    ) -> Result<PlayOutcome> {
        let mut step = first;
        let mut advanced = false;

        loop {
            match step {
                Step::Advance(cause) => {
                    advanced = true;
                    if !self.advance_locked(chat_id, &mut guard, cause).await {
                        info!("Queue exhausted for chat {}", chat_id);
                        self.stop_locked(chat_id, &mut guard, StopReason::QueueExhausted).await;
                        return Ok(PlayOutcome::Stopped);
                    }
                    step = Step::Start(StartMode::Fresh);
                }

                Step::Start(mode) => {
                    self.ensure_session(chat_id, &mut guard).await;

                    let (resumed, resolution) = self.resolve_head(chat_id, guard).await;
                    guard = resumed;

                    match resolution {
                        Resolution::Ready => {}
                        Resolution::Superseded => {
                            // Still Starting and no other drive waiting on the
                            // resolver: nobody else will start this chat
                            let orphaned = guard.resolving == 0
                                && guard.session.as_ref().is_some_and(|s| !s.is_active());
                            if !orphaned {
                                return Ok(PlayOutcome::Superseded);
                            }
                            if guard.current().is_some() {
                                debug!("Chat {} head changed while starting; restarting", chat_id);
                                step = Step::Start(StartMode::Fresh);
                                continue;
                            }
                            self.abandon_start(chat_id, &mut guard);
                            return Ok(PlayOutcome::Superseded);
                        }
                        Resolution::Empty => {
                            self.stop_locked(chat_id, &mut guard, StopReason::QueueExhausted).await;
                            return Ok(PlayOutcome::Stopped);
                        }
                        Resolution::Failed(err) if advanced => {
                            let Some(track) = guard.current().cloned() else {
                                return Ok(PlayOutcome::Stopped);
                            };
                            warn!("Resolution failed for {} in chat {}: {}", track.id, chat_id, err);
                            self.report_failure(chat_id, &track, &err.to_string(), "stop");
                            self.stop_locked(chat_id, &mut guard, StopReason::Failure).await;
                            self.notify(chat_id, &messages::file_not_found(&track)).await;
                            return Ok(PlayOutcome::Stopped);
                        }
                        Resolution::Failed(err) => {
                            let Some(track) = guard.current().cloned() else {
                                return Err(err);
                            };
                            warn!("Resolution failed for {} in chat {}: {}", track.id, chat_id, err);
                            self.report_failure(chat_id, &track, &err.to_string(), "stop");
                            self.notify(chat_id, &messages::media_unavailable(&track)).await;

                            if guard.is_active() {
                                self.stop_locked(chat_id, &mut guard, StopReason::Failure).await;
                            } else {
                                self.abandon_start(chat_id, &mut guard);
                            }
                            return Err(err);
                        }
                    }

                    match self.start_locked(chat_id, &mut guard, mode).await {
                        Ok(()) => {
                            self.on_started(chat_id, &mut guard, mode).await;
                            return Ok(PlayOutcome::Playing);
                        }
                        Err(err) => {
                            let track = guard.current().cloned();
                            let title = track.as_ref().map_or("", |t| t.title.as_str());
                            match err.recovery() {
                                Recovery::SkipForward => {
                                    warn!(
                                        "Transport failed for '{}' in chat {}: {}; skipping",
                                        title, chat_id, err
                                    );
                                    if let Some(track) = &track {
                                        self.report_failure(chat_id, track, &err.to_string(), "skip");
                                        self.notify(chat_id, &messages::transport_failure(track, &err))
                                            .await;
                                    }
                                    step = Step::Advance(AdvanceCause::Failed);
                                }
                                Recovery::Stop => {
                                    error!(
                                        "Transport failed for '{}' in chat {}: {}; stopping",
                                        title, chat_id, err
                                    );
                                    self.stop_locked(chat_id, &mut guard, StopReason::Failure).await;
                                    if let Some(track) = &track {
                                        self.report_failure(chat_id, track, &err.to_string(), "stop");
                                        self.notify(chat_id, &messages::transport_failure(track, &err))
                                            .await;
                                    }
                                    return Ok(PlayOutcome::Stopped);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Create the session (Idle → Starting) if the chat has none
    async fn ensure_session(&self, chat_id: ChatId, guard: &mut ChatGuard) {
        if guard.session.is_some() {
            return;
        }

        let loop_mode = match self.store.get_loop_mode(chat_id).await {
            Ok(mode) => mode,
            Err(e) => {
                warn!("Failed to load loop mode for chat {}: {}", chat_id, e);
                LoopMode::default()
            }
        };
        let assistant = match self.transports.assistant_for(chat_id).await {
            Ok(num) => num,
            Err(e) => {
                // start_locked reports the same failure as a transport error
                warn!("No assistant for chat {}: {}", chat_id, e);
                0
            }
        };

        guard.session = Some(SessionState::starting(loop_mode, assistant));
        self.emit_phase(chat_id, SessionPhase::Idle, SessionPhase::Starting);
        debug!("Chat {} session starting (assistant {})", chat_id, assistant);
    }

    /// Make sure the head has a playable file
    ///
    /// Resolution runs with the chat unlocked. The guard handed back is a
    /// fresh lock of the same slot; `Superseded` means another command
    /// changed the head or stopped the chat meanwhile, and the result was
    /// dropped.
    async fn resolve_head(&self, chat_id: ChatId, mut guard: ChatGuard) -> (ChatGuard, Resolution) {
        let Some(head) = guard.current() else {
            return (guard, Resolution::Empty);
        };
        if head.is_resolved() {
            return (guard, Resolution::Ready);
        }
        if head.source == TrackSource::Direct {
            let err = Error::MediaUnavailable(format!("direct track {} has no file", head.id));
            return (guard, Resolution::Failed(err));
        }

        let track_id = head.id.clone();
        let wants_video = head.is_video;
        guard.generation += 1;
        guard.resolving += 1;
        let generation = guard.generation;
        // Holding the slot keeps it mapped to this chat until we re-lock
        let slot = Arc::clone(OwnedMutexGuard::mutex(&guard));
        drop(guard);

        debug!("Resolving {} for chat {}", track_id, chat_id);
        let result = self.resolver.resolve(&track_id, wants_video).await;

        let mut guard = slot.lock_owned().await;
        guard.resolving -= 1;
        let same_head = guard.current().is_some_and(|t| t.id == track_id);
        if guard.generation != generation || !same_head {
            debug!(
                "Discarding stale resolution of {} for chat {}",
                track_id, chat_id
            );
            return (guard, Resolution::Superseded);
        }

        match result {
            Ok(path) => {
                if let Some(head) = guard.queue.as_mut().and_then(ChatQueue::current_mut) {
                    head.local_path = Some(path);
                }
                (guard, Resolution::Ready)
            }
            Err(Error::MediaUnavailable(msg)) => (guard, Resolution::Failed(Error::MediaUnavailable(msg))),
            Err(other) => (guard, Resolution::Failed(Error::MediaUnavailable(other.to_string()))),
        }
    }

    /// Hand the resolved head to the chat's transport client
    async fn start_locked(
        &self,
        chat_id: ChatId,
        guard: &mut ChatGuard,
        mode: StartMode,
    ) -> std::result::Result<(), TransportError> {
        let (num, client) = self
            .transports
            .client_for(chat_id)
            .await
            .map_err(|e| TransportError::Server(e.to_string()))?;
        if let Some(session) = guard.session.as_mut() {
            session.assistant = num;
        }

        let Some(track) = guard.current() else {
            return Err(TransportError::Server("queue is empty".to_string()));
        };
        let Some(path) = track.local_path.clone() else {
            return Err(TransportError::FileMissing(track.id.clone()));
        };

        let seek_ms = match mode {
            StartMode::Fresh => 0,
            StartMode::Reposition { seek_ms } => seek_ms,
        };
        let options = StreamOptions {
            video: track.is_video,
            seek_ms,
            duration_ms: Some(track.duration_ms()).filter(|ms| *ms > 0),
        };

        client.start_stream(chat_id, &path, options).await
    }

    /// Bookkeeping after a successful stream start
    async fn on_started(&self, chat_id: ChatId, guard: &mut ChatGuard, mode: StartMode) {
        let slot = &mut **guard;
        let session = slot
            .session
            .get_or_insert_with(|| SessionState::starting(LoopMode::default(), 0));
        let old_phase = session.transition(SessionPhase::Playing);

        if old_phase != SessionPhase::Playing {
            self.emit_phase(chat_id, old_phase, SessionPhase::Playing);
        }
        if !matches!(old_phase, SessionPhase::Playing | SessionPhase::Paused) {
            self.set_active_index(chat_id, true);
        }
        // Sets playing=1 too, so it also clears a persisted pause
        if old_phase != SessionPhase::Playing {
            if let Err(e) = self.store.set_active_flag(chat_id, true).await {
                warn!("Failed to persist active flag for chat {}: {}", chat_id, e);
            }
        }

        let Some(track) = slot.queue.as_mut().and_then(ChatQueue::current_mut) else {
            return;
        };

        match mode {
            StartMode::Fresh => {
                session.track_started_at = Some(chrono::Utc::now());
                self.record_play(chat_id, track);
                self.announce_now_playing(chat_id, track).await;
                self.state.broadcast_event(VcmpEvent::TrackStarted {
                    chat_id,
                    track_id: track.id.clone(),
                    title: track.title.clone(),
                    requested_by: track.requested_by.clone(),
                    is_video: track.is_video,
                    timestamp: chrono::Utc::now(),
                });
                info!("Chat {} now playing '{}' ({})", chat_id, track.title, track.id);
            }
            StartMode::Reposition { seek_ms } => {
                self.state.broadcast_event(VcmpEvent::TrackRepositioned {
                    chat_id,
                    track_id: track.id.clone(),
                    position_ms: seek_ms,
                    timestamp: chrono::Utc::now(),
                });
                info!("Chat {} repositioned '{}' to {}ms", chat_id, track.title, seek_ms);
            }
        }
    }

    /// Move the head out according to the loop mode
    ///
    /// Returns true when there is a head to start next.
    pub(super) async fn advance_locked(
        &self,
        chat_id: ChatId,
        guard: &mut ChatGuard,
        cause: AdvanceCause,
    ) -> bool {
        let slot = &mut **guard;
        slot.generation += 1;
        let loop_mode = slot.session.as_ref().map(|s| s.loop_mode).unwrap_or_default();

        let Some(queue) = slot.queue.as_mut() else {
            return false;
        };

        if let Some(id) = queue.current_mut().and_then(|t| t.ui_message_id.take()) {
            if let Err(e) = self.notifier.delete_message(chat_id, id).await {
                debug!("Failed to delete message {} in chat {}: {}", id, chat_id, e);
            }
        }

        match (cause, loop_mode) {
            (AdvanceCause::Finished, LoopMode::LoopOne) => {
                debug!("Chat {} loop-one: replaying current track", chat_id);
                return !queue.is_empty();
            }
            (AdvanceCause::Finished | AdvanceCause::Forced, LoopMode::LoopAll) => {
                if let Some(current) = queue.current().cloned() {
                    queue.add(current);
                }
            }
            _ => {}
        }

        let has_next = queue.get_next().is_some();
        let length = queue.len();
        slot.drop_empty_queue();
        self.emit_queue_changed(chat_id, length, QueueChangeTrigger::Advance);
        debug!("Chat {} advanced ({:?}, {}): {} left", chat_id, cause, loop_mode, length);
        has_next
    }

    /// Drop a head that could not be resolved; true if another track follows
    pub(super) async fn discard_head(&self, chat_id: ChatId, guard: &mut ChatGuard) -> bool {
        let slot = &mut **guard;
        slot.generation += 1;
        let Some(queue) = slot.queue.as_mut() else {
            return false;
        };

        if let Some(id) = queue.current_mut().and_then(|t| t.ui_message_id.take()) {
            if let Err(e) = self.notifier.delete_message(chat_id, id).await {
                debug!("Failed to delete message {} in chat {}: {}", id, chat_id, e);
            }
        }

        let has_next = queue.get_next().is_some();
        let length = queue.len();
        slot.drop_empty_queue();
        self.emit_queue_changed(chat_id, length, QueueChangeTrigger::Discarded);
        has_next
    }

    /// Starting → Idle without having joined a call
    fn abandon_start(&self, chat_id: ChatId, guard: &mut ChatGuard) {
        guard.generation += 1;
        guard.drop_empty_queue();
        if let Some(session) = guard.session.take() {
            self.emit_phase(chat_id, session.phase(), SessionPhase::Idle);
        }
        debug!("Chat {} start abandoned", chat_id);
    }

    /// Tear the chat's session down
    ///
    /// Local state is always left clean (no queue, no session, flag
    /// cleared); remote failures are logged and swallowed.
    pub(super) async fn stop_locked(&self, chat_id: ChatId, guard: &mut ChatGuard, reason: StopReason) {
        let slot = &mut **guard;
        slot.generation += 1;

        if slot.queue.take().is_some() {
            self.emit_queue_changed(chat_id, 0, QueueChangeTrigger::Cleared);
        }
        if let Some(session) = slot.session.take() {
            self.emit_phase(chat_id, session.phase(), SessionPhase::Idle);
        }
        self.set_active_index(chat_id, false);

        if let Err(e) = self.store.set_active_flag(chat_id, false).await {
            warn!("Failed to clear active flag for chat {}: {}", chat_id, e);
        }

        match self.transports.client_for(chat_id).await {
            Ok((_, client)) => {
                if let Err(e) = client.leave_call(chat_id, false).await {
                    warn!("Failed to leave call in chat {}: {}", chat_id, e);
                }
            }
            Err(e) => warn!("No transport to leave chat {}: {}", chat_id, e),
        }

        self.state.broadcast_event(VcmpEvent::SessionStopped {
            chat_id,
            reason,
            timestamp: chrono::Utc::now(),
        });
        info!("Chat {} stopped ({:?})", chat_id, reason);
    }

    // ========================================================================
    // Side effects
    // ========================================================================

    /// Post a message; failures are logged only
    pub(super) async fn notify(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.notifier.send_message(chat_id, text).await {
            warn!("Failed to notify chat {}: {}", chat_id, e);
        }
    }

    /// Turn the track's message into "now playing", or post a new one
    async fn announce_now_playing(&self, chat_id: ChatId, track: &mut Track) {
        let text = messages::now_playing(track);

        if let Some(id) = track.ui_message_id {
            match self.notifier.edit_message(chat_id, id, &text).await {
                Ok(()) => return,
                Err(e) => debug!("Failed to edit message {} in chat {}: {}", id, chat_id, e),
            }
        }

        track.ui_message_id = match self.notifier.send_message(chat_id, &text).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to announce track in chat {}: {}", chat_id, e);
                None
            }
        };
    }

    /// Append a statistics row without waiting for it
    fn record_play(&self, chat_id: ChatId, track: &Track) {
        let store = Arc::clone(&self.store);
        let record = PlayRecord {
            track_id: track.id.clone(),
            chat_id,
            user_id: track.requested_by_id,
            title: track.title.clone(),
            duration_seconds: track.duration_seconds,
        };
        tokio::spawn(async move {
            if let Err(e) = store.record_play(record).await {
                warn!("Failed to record play in chat {}: {}", chat_id, e);
            }
        });
    }

    fn report_failure(&self, chat_id: ChatId, track: &Track, error: &str, recovery: &str) {
        self.state.increment_recoveries();
        self.state.broadcast_event(VcmpEvent::PlaybackFailed {
            chat_id,
            track_id: track.id.clone(),
            error: error.to_string(),
            recovery: recovery.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    pub(super) fn emit_phase(&self, chat_id: ChatId, old_phase: SessionPhase, new_phase: SessionPhase) {
        self.state.broadcast_event(VcmpEvent::SessionStateChanged {
            chat_id,
            old_phase,
            new_phase,
            timestamp: chrono::Utc::now(),
        });
    }

    pub(super) fn emit_queue_changed(&self, chat_id: ChatId, length: usize, trigger: QueueChangeTrigger) {
        self.state.broadcast_event(VcmpEvent::QueueChanged {
            chat_id,
            length,
            trigger,
            timestamp: chrono::Utc::now(),
        });
    }
}
