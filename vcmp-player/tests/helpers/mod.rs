//! Test helpers for vcmp-player integration tests
//!
//! Scriptable collaborators for the orchestrator:
//! - MockTransport: records every call, fails starts on demand
//! - MockResolver: fake cache paths, per-track failures, optional delay
//! - RecordingNotifier: keeps every sent/edited/deleted message
//! - Harness: orchestrator wired to the mocks over an in-memory store

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use vcmp_common::db::init_memory_database;
use vcmp_common::events::VcmpEvent;
use vcmp_common::{ChatId, MessageId};
use vcmp_player::api::AppContext;
use vcmp_player::db::{SessionStore, SqliteStore};
use vcmp_player::notifier::ChatNotifier;
use vcmp_player::playback::{PlaybackOrchestrator, Track};
use vcmp_player::resolver::MediaResolver;
use vcmp_player::transport::{StreamOptions, TransportError, TransportPool, VoiceTransport};
use vcmp_player::{Error, Result, SharedState};

// ============================================================================
// Transport
// ============================================================================

/// One call received by the mock transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Start {
        chat_id: ChatId,
        track_id: String,
        seek_ms: u64,
    },
    Pause(ChatId),
    Resume(ChatId),
    Leave(ChatId),
}

#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    /// Track id (file stem) → error returned by every start of it
    failures: Mutex<HashMap<String, TransportError>>,
    next_failure: Mutex<Option<TransportError>>,
    position: Mutex<Option<u64>>,
    paused: Mutex<HashSet<ChatId>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every start of `track_id` fails with `err`
    pub fn fail_start_for(&self, track_id: &str, err: TransportError) {
        self.failures.lock().unwrap().insert(track_id.to_string(), err);
    }

    /// The next start (whatever the track) fails with `err`
    pub fn fail_next_start(&self, err: TransportError) {
        *self.next_failure.lock().unwrap() = Some(err);
    }

    /// Position reported to seek
    pub fn set_position(&self, position_ms: Option<u64>) {
        *self.position.lock().unwrap() = position_ms;
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Track ids of successful starts, in order
    pub fn started_tracks(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Start { track_id, .. } => Some(track_id),
                _ => None,
            })
            .collect()
    }

    pub fn last_seek_ms(&self) -> Option<u64> {
        self.calls().into_iter().rev().find_map(|call| match call {
            TransportCall::Start { seek_ms, .. } => Some(seek_ms),
            _ => None,
        })
    }

    pub fn leave_count(&self, chat_id: ChatId) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == TransportCall::Leave(chat_id))
            .count()
    }
}

#[async_trait]
impl VoiceTransport for MockTransport {
    async fn start_stream(
        &self,
        chat_id: ChatId,
        path: &Path,
        options: StreamOptions,
    ) -> std::result::Result<(), TransportError> {
        let track_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(err) = self.next_failure.lock().unwrap().take() {
            return Err(err);
        }
        if let Some(err) = self.failures.lock().unwrap().get(&track_id) {
            return Err(err.clone());
        }

        self.paused.lock().unwrap().remove(&chat_id);
        self.calls.lock().unwrap().push(TransportCall::Start {
            chat_id,
            track_id,
            seek_ms: options.seek_ms,
        });
        Ok(())
    }

    async fn pause(&self, chat_id: ChatId) -> std::result::Result<bool, TransportError> {
        self.calls.lock().unwrap().push(TransportCall::Pause(chat_id));
        Ok(self.paused.lock().unwrap().insert(chat_id))
    }

    async fn resume(&self, chat_id: ChatId) -> std::result::Result<bool, TransportError> {
        self.calls.lock().unwrap().push(TransportCall::Resume(chat_id));
        Ok(self.paused.lock().unwrap().remove(&chat_id))
    }

    async fn position(&self, _chat_id: ChatId) -> std::result::Result<Option<u64>, TransportError> {
        Ok(*self.position.lock().unwrap())
    }

    async fn leave_call(&self, chat_id: ChatId, _close: bool) -> std::result::Result<(), TransportError> {
        self.calls.lock().unwrap().push(TransportCall::Leave(chat_id));
        Ok(())
    }

    async fn ping(&self) -> f64 {
        12.5
    }
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Default)]
pub struct MockResolver {
    failures: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, track_id: &str) {
        self.failures.lock().unwrap().insert(track_id.to_string());
    }

    /// Every resolution sleeps this long before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaResolver for MockResolver {
    async fn resolve(&self, track_id: &str, wants_video: bool) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failures.lock().unwrap().contains(track_id) {
            return Err(Error::MediaUnavailable(format!("{} is gone", track_id)));
        }
        let ext = if wants_video { "mp4" } else { "webm" };
        Ok(PathBuf::from(format!("/media/{}.{}", track_id, ext)))
    }
}

// ============================================================================
// Notifier
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    next_id: AtomicI64,
    sent: Mutex<Vec<(ChatId, MessageId, String)>>,
    edited: Mutex<Vec<(ChatId, MessageId, String)>>,
    deleted: Mutex<Vec<(ChatId, MessageId)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(ChatId, MessageId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn edited(&self) -> Vec<(ChatId, MessageId, String)> {
        self.edited.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<(ChatId, MessageId)> {
        self.deleted.lock().unwrap().clone()
    }

    /// Number of messages sent to the chat that contain `needle`
    pub fn sent_containing(&self, chat_id: ChatId, needle: &str) -> usize {
        self.sent()
            .iter()
            .filter(|(chat, _, text)| *chat == chat_id && text.contains(needle))
            .count()
    }
}

#[async_trait]
impl ChatNotifier for RecordingNotifier {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().unwrap().push((chat_id, id, text.to_string()));
        Ok(id)
    }

    async fn edit_message(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<()> {
        self.edited
            .lock()
            .unwrap()
            .push((chat_id, message_id, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.deleted.lock().unwrap().push((chat_id, message_id));
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Orchestrator over one mock transport and an in-memory store
pub struct Harness {
    pub orchestrator: Arc<PlaybackOrchestrator>,
    pub transport: Arc<MockTransport>,
    pub resolver: Arc<MockResolver>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<SqliteStore>,
    pub state: Arc<SharedState>,
}

impl Harness {
    pub async fn new() -> Self {
        let pool = init_memory_database()
            .await
            .expect("Failed to create in-memory database");
        let store = Arc::new(SqliteStore::new(pool));
        let state = Arc::new(SharedState::new(256));
        let transport = Arc::new(MockTransport::new());
        let resolver = Arc::new(MockResolver::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let transports = TransportPool::new(
            vec![transport.clone() as Arc<dyn VoiceTransport>],
            store.clone(),
        );
        let orchestrator = Arc::new(PlaybackOrchestrator::new(
            transports,
            resolver.clone(),
            store.clone(),
            notifier.clone(),
            state.clone(),
        ));

        Self {
            orchestrator,
            transport,
            resolver,
            notifier,
            store,
            state,
        }
    }

    /// Router state for API tests
    pub fn context(&self, duration_limit_secs: u64) -> AppContext {
        AppContext {
            state: self.state.clone(),
            orchestrator: self.orchestrator.clone(),
            store: self.store.clone() as Arc<dyn SessionStore>,
            duration_limit_secs,
        }
    }

    pub fn events(&self) -> broadcast::Receiver<VcmpEvent> {
        self.state.subscribe_events()
    }

    /// Ids of the chat's queue in playback order
    pub async fn queue_ids(&self, chat_id: ChatId) -> Vec<String> {
        self.orchestrator
            .snapshot(chat_id)
            .await
            .into_iter()
            .map(|t| t.id)
            .collect()
    }

    pub async fn current_id(&self, chat_id: ChatId) -> Option<String> {
        self.orchestrator.current(chat_id).await.map(|t| t.id)
    }

    /// Play count of a track once `expected` spawned writes have landed
    ///
    /// Gives up after half a second and returns whatever was counted.
    pub async fn wait_for_plays(&self, chat_id: ChatId, track_id: &str, expected: i64) -> i64 {
        let mut plays = 0;
        for _ in 0..50 {
            let top = self
                .store
                .top_tracks(Some(chat_id), 100)
                .await
                .expect("top_tracks failed");
            plays = top
                .iter()
                .find(|t| t.track_id == track_id)
                .map_or(0, |t| t.plays);
            if plays >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        plays
    }
}

/// Resolver-backed track titled after its id
pub fn track(id: &str) -> Track {
    Track::new(id, format!("Track {}", id), 180)
}

/// Drain every event already broadcast
pub fn drain(rx: &mut broadcast::Receiver<VcmpEvent>) -> Vec<VcmpEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Count drained events of one type
pub fn count_events(events: &[VcmpEvent], event_type: &str) -> usize {
    events.iter().filter(|e| e.event_type() == event_type).count()
}
