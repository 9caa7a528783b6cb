//! Integration tests for the playback orchestrator
//!
//! Drives the orchestrator against the mock transport, resolver and
//! notifier in `helpers`, over a real (in-memory) SQLite store.

mod helpers;

use helpers::{count_events, drain, track, Harness};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use vcmp_common::events::{CloseReason, LoopMode, SessionPhase, StopReason, VcmpEvent};
use vcmp_player::db::SessionStore;
use vcmp_player::playback::{Enqueued, EventRouter, PlayOutcome};
use vcmp_player::transport::{TransportError, TransportUpdate};
use vcmp_player::Error;

const CHAT: i64 = -1001;

/// Harness with `ids` queued in CHAT and the first one playing
async fn playing(ids: &[&str]) -> Harness {
    let h = Harness::new().await;
    let (first, rest) = ids.split_first().expect("at least one id");
    assert_eq!(h.orchestrator.play(CHAT, track(first)).await.unwrap(), Enqueued::Started);
    for id in rest {
        h.orchestrator.add(CHAT, track(id)).await;
    }
    h
}

// ============================================================================
// Loop modes
// ============================================================================

#[tokio::test]
async fn test_loop_all_cycles_through_queue() {
    let h = playing(&["a", "b", "c"]).await;
    h.orchestrator.set_loop_mode(CHAT, LoopMode::LoopAll).await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        assert_eq!(h.orchestrator.play_next(CHAT).await.unwrap(), PlayOutcome::Playing);
        seen.push(h.current_id(CHAT).await.unwrap());
        assert_eq!(h.queue_ids(CHAT).await.len(), 3);
    }

    assert_eq!(seen, vec!["b", "c", "a"]);
    assert_eq!(h.transport.started_tracks(), vec!["a", "b", "c", "a"]);
}

#[tokio::test]
async fn test_loop_one_holds_current_track() {
    let h = playing(&["a", "b"]).await;
    h.orchestrator.set_loop_mode(CHAT, LoopMode::LoopOne).await.unwrap();

    for _ in 0..2 {
        assert_eq!(h.orchestrator.play_next(CHAT).await.unwrap(), PlayOutcome::Playing);
        assert_eq!(h.queue_ids(CHAT).await, vec!["a", "b"]);
    }
    assert_eq!(h.transport.started_tracks(), vec!["a", "a", "a"]);
}

#[tokio::test]
async fn test_loop_mode_persists_without_session() {
    let h = Harness::new().await;

    assert_eq!(h.orchestrator.cycle_loop_mode(CHAT).await.unwrap(), LoopMode::LoopAll);
    assert_eq!(h.store.get_loop_mode(CHAT).await.unwrap(), LoopMode::LoopAll);

    h.orchestrator.play(CHAT, track("a")).await.unwrap();
    let session = h.orchestrator.session(CHAT).await.unwrap();
    assert_eq!(session.loop_mode, LoopMode::LoopAll);
}

// ============================================================================
// Advancing and stopping
// ============================================================================

#[tokio::test]
async fn test_exhausted_queue_stops_once() {
    let h = playing(&["a"]).await;
    assert!(h.store.get_active_flag(CHAT).await.unwrap());
    let mut rx = h.events();

    assert_eq!(h.orchestrator.play_next(CHAT).await.unwrap(), PlayOutcome::Stopped);

    let events = drain(&mut rx);
    assert_eq!(count_events(&events, "SessionStopped"), 1);
    assert!(events.iter().any(|e| matches!(
        e,
        VcmpEvent::SessionStopped { reason: StopReason::QueueExhausted, .. }
    )));
    assert_eq!(h.transport.leave_count(CHAT), 1);
    assert!(!h.store.get_active_flag(CHAT).await.unwrap());
    assert!(h.orchestrator.session(CHAT).await.is_none());
    assert!(h.orchestrator.active_chats().is_empty());
}

#[tokio::test]
async fn test_play_next_on_idle_chat_is_noop() {
    let h = Harness::new().await;
    assert_eq!(h.orchestrator.play_next(CHAT).await.unwrap(), PlayOutcome::Inactive);
    assert_eq!(h.transport.leave_count(CHAT), 0);
}

#[tokio::test]
async fn test_stop_clears_queue_and_session() {
    let h = playing(&["a", "b"]).await;

    h.orchestrator.stop(CHAT).await.unwrap();

    assert!(h.queue_ids(CHAT).await.is_empty());
    assert!(h.orchestrator.session(CHAT).await.is_none());
    assert!(!h.store.get_active_flag(CHAT).await.unwrap());
    assert_eq!(h.transport.leave_count(CHAT), 1);

    // Stopping an idle chat is harmless
    h.orchestrator.stop(CHAT).await.unwrap();
    assert!(h.orchestrator.session(CHAT).await.is_none());
}

#[tokio::test]
async fn test_call_closed_tears_down() {
    let h = playing(&["a", "b"]).await;
    let mut rx = h.events();

    h.orchestrator.on_call_closed(CHAT, CloseReason::Kicked).await;

    assert!(h.orchestrator.session(CHAT).await.is_none());
    assert!(h.queue_ids(CHAT).await.is_empty());
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        VcmpEvent::SessionStopped {
            reason: StopReason::CallClosed(CloseReason::Kicked),
            ..
        }
    )));
}

#[tokio::test]
async fn test_chats_are_isolated() {
    let h = playing(&["a"]).await;
    h.orchestrator.play(7, track("x")).await.unwrap();
    assert_eq!(h.orchestrator.active_chats(), vec![CHAT, 7]);

    h.orchestrator.stop(CHAT).await.unwrap();

    assert_eq!(h.orchestrator.active_chats(), vec![7]);
    assert_eq!(h.current_id(7).await.as_deref(), Some("x"));
    assert!(h.store.get_active_flag(7).await.unwrap());
}

// ============================================================================
// Failure recovery
// ============================================================================

#[tokio::test]
async fn test_missing_file_skips_forward() {
    let h = playing(&["a", "b", "c"]).await;
    h.transport
        .fail_start_for("b", TransportError::FileMissing("/media/b.webm".into()));

    assert_eq!(h.orchestrator.play_next(CHAT).await.unwrap(), PlayOutcome::Playing);

    assert_eq!(h.current_id(CHAT).await.as_deref(), Some("c"));
    assert_eq!(h.queue_ids(CHAT).await, vec!["c"]);
    assert_eq!(h.notifier.sent_containing(CHAT, "missing"), 1);
    assert_eq!(h.state.recoveries(), 1);
    assert!(h.orchestrator.session(CHAT).await.unwrap().is_active());
}

#[tokio::test]
async fn test_failed_track_is_not_looped() {
    let h = playing(&["a", "b"]).await;
    h.orchestrator.set_loop_mode(CHAT, LoopMode::LoopOne).await.unwrap();
    h.transport.fail_next_start(TransportError::NoAudioSource);

    // Replay of "a" fails; the failed head is dropped despite loop-one
    assert_eq!(h.orchestrator.play_next(CHAT).await.unwrap(), PlayOutcome::Playing);
    assert_eq!(h.current_id(CHAT).await.as_deref(), Some("b"));
}

#[tokio::test]
async fn test_server_error_stops_session() {
    let h = playing(&["a", "b", "c"]).await;
    h.transport
        .fail_start_for("b", TransportError::Server("connection reset".into()));

    assert_eq!(h.orchestrator.play_next(CHAT).await.unwrap(), PlayOutcome::Stopped);

    assert!(h.orchestrator.session(CHAT).await.is_none());
    assert!(h.queue_ids(CHAT).await.is_empty());
    assert!(h.orchestrator.active_chats().is_empty());
    assert_eq!(h.notifier.sent_containing(CHAT, "connection reset"), 1);
}

#[tokio::test]
async fn test_no_active_call_on_first_start() {
    let h = Harness::new().await;
    h.transport.fail_next_start(TransportError::NoActiveCall);

    h.orchestrator.play(CHAT, track("a")).await.unwrap();

    assert!(h.orchestrator.session(CHAT).await.is_none());
    assert!(h.queue_ids(CHAT).await.is_empty());
    assert_eq!(h.notifier.sent_containing(CHAT, "No active voice chat"), 1);
}

#[tokio::test]
async fn test_initial_resolution_failure_leaves_chat_idle() {
    let h = Harness::new().await;
    h.resolver.fail("a");

    let result = h.orchestrator.play_media(CHAT, track("a"), 0).await;

    assert!(matches!(result, Err(Error::MediaUnavailable(_))));
    assert!(h.orchestrator.session(CHAT).await.is_none());
    assert!(h.queue_ids(CHAT).await.is_empty());
    assert!(h.transport.started_tracks().is_empty());
    assert_eq!(h.notifier.sent_containing(CHAT, "Could not fetch"), 1);
}

#[tokio::test]
async fn test_initial_resolution_failure_keeps_queue() {
    let h = Harness::new().await;
    h.orchestrator.add(CHAT, track("a")).await;
    h.orchestrator.add(CHAT, track("b")).await;
    h.resolver.fail("a");

    let result = h.orchestrator.play_media(CHAT, track("a"), 0).await;

    assert!(matches!(result, Err(Error::MediaUnavailable(_))));
    assert_eq!(h.queue_ids(CHAT).await, vec!["a", "b"]);
    assert!(h.transport.started_tracks().is_empty());
    assert!(h.orchestrator.session(CHAT).await.is_none());
    assert!(h.orchestrator.active_chats().is_empty());
    assert_eq!(h.notifier.sent_containing(CHAT, "Could not fetch"), 1);
}

#[tokio::test]
async fn test_playlist_moves_past_unavailable_first_track() {
    let h = Harness::new().await;
    h.resolver.fail("a");

    h.orchestrator
        .enqueue_many(CHAT, vec![track("a"), track("b")])
        .await
        .unwrap();

    assert_eq!(h.current_id(CHAT).await.as_deref(), Some("b"));
    assert_eq!(h.queue_ids(CHAT).await, vec!["b"]);
    assert_eq!(h.transport.started_tracks(), vec!["b"]);
    assert_eq!(h.notifier.sent_containing(CHAT, "Could not fetch"), 1);
}

#[tokio::test]
async fn test_head_change_while_starting_plays_new_head() {
    let h = Harness::new().await;
    h.orchestrator.add(CHAT, track("a")).await;
    h.orchestrator.add(CHAT, track("b")).await;
    h.resolver.set_delay(Duration::from_millis(200));

    let orchestrator = h.orchestrator.clone();
    let pending =
        tokio::spawn(async move { orchestrator.play_media(CHAT, track("a"), 0).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.orchestrator.get_next(CHAT).await.map(|t| t.id).as_deref(), Some("b"));

    assert_eq!(pending.await.unwrap().unwrap(), PlayOutcome::Playing);
    assert_eq!(h.transport.started_tracks(), vec!["b"]);
    assert_eq!(h.orchestrator.session(CHAT).await.unwrap().phase(), SessionPhase::Playing);

    // The chat still takes commands
    assert_eq!(h.orchestrator.play_next(CHAT).await.unwrap(), PlayOutcome::Stopped);
}

#[tokio::test]
async fn test_queue_cleared_while_starting_goes_idle() {
    let h = Harness::new().await;
    h.resolver.set_delay(Duration::from_millis(200));

    let orchestrator = h.orchestrator.clone();
    let pending =
        tokio::spawn(async move { orchestrator.play_media(CHAT, track("a"), 0).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    h.orchestrator.clear(CHAT).await;

    assert_eq!(pending.await.unwrap().unwrap(), PlayOutcome::Superseded);
    assert!(h.orchestrator.session(CHAT).await.is_none());
    assert!(h.transport.started_tracks().is_empty());

    h.resolver.set_delay(Duration::from_millis(0));
    assert_eq!(h.orchestrator.play(CHAT, track("b")).await.unwrap(), Enqueued::Started);
    assert_eq!(h.transport.started_tracks(), vec!["b"]);
}

#[tokio::test]
async fn test_resolution_failure_after_advance_stops() {
    let h = playing(&["a", "b", "c"]).await;
    h.resolver.fail("b");

    assert_eq!(h.orchestrator.play_next(CHAT).await.unwrap(), PlayOutcome::Stopped);

    assert!(h.orchestrator.session(CHAT).await.is_none());
    assert_eq!(h.notifier.sent_containing(CHAT, "File not found"), 1);
}

#[tokio::test]
async fn test_stale_resolution_is_discarded() {
    let h = Harness::new().await;
    h.resolver.set_delay(Duration::from_millis(200));

    let orchestrator = h.orchestrator.clone();
    let pending =
        tokio::spawn(async move { orchestrator.play_media(CHAT, track("a"), 0).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    h.orchestrator.stop(CHAT).await.unwrap();

    let outcome = pending.await.unwrap().unwrap();
    assert_eq!(outcome, PlayOutcome::Superseded);
    assert!(h.transport.started_tracks().is_empty());
    assert!(h.orchestrator.session(CHAT).await.is_none());
}

// ============================================================================
// Seek, pause, resume, replay
// ============================================================================

#[tokio::test]
async fn test_seek_clamps_and_repositions() {
    let h = playing(&["a"]).await;
    let mut rx = h.events();
    h.transport.set_position(Some(5_000));

    assert_eq!(h.orchestrator.seek(CHAT, -30).await.unwrap(), 0);
    assert_eq!(h.transport.last_seek_ms(), Some(0));

    h.transport.set_position(Some(10_000));
    assert_eq!(h.orchestrator.seek(CHAT, 20).await.unwrap(), 30_000);
    assert_eq!(h.transport.last_seek_ms(), Some(30_000));

    let events = drain(&mut rx);
    assert_eq!(count_events(&events, "TrackRepositioned"), 2);
    assert_eq!(count_events(&events, "TrackStarted"), 0);
    assert_eq!(h.wait_for_plays(CHAT, "a", 1).await, 1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.wait_for_plays(CHAT, "a", 1).await, 1);
}

#[tokio::test]
async fn test_seek_without_position() {
    let h = Harness::new().await;
    assert!(matches!(h.orchestrator.seek(CHAT, 10).await, Err(Error::SeekUnavailable)));

    h.orchestrator.play(CHAT, track("a")).await.unwrap();
    h.transport.set_position(None);
    assert!(matches!(h.orchestrator.seek(CHAT, 10).await, Err(Error::SeekUnavailable)));
}

#[tokio::test]
async fn test_seek_restart_failure_is_reported() {
    let h = playing(&["a", "b"]).await;
    h.transport.set_position(Some(10_000));
    h.transport
        .fail_next_start(TransportError::Server("connection reset".into()));

    let result = h.orchestrator.seek(CHAT, 5).await;

    assert!(matches!(result, Err(Error::InvalidState(_))));
    assert!(h.orchestrator.session(CHAT).await.is_none());
    assert_eq!(h.notifier.sent_containing(CHAT, "connection reset"), 1);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let h = playing(&["a"]).await;

    assert!(h.orchestrator.pause(CHAT).await.unwrap());
    assert_eq!(h.orchestrator.session(CHAT).await.unwrap().phase(), SessionPhase::Paused);
    assert!(!h.orchestrator.pause(CHAT).await.unwrap());

    assert!(h.orchestrator.resume(CHAT).await.unwrap());
    assert_eq!(h.orchestrator.session(CHAT).await.unwrap().phase(), SessionPhase::Playing);

    assert!(!h.orchestrator.pause(99).await.unwrap());
}

#[tokio::test]
async fn test_replay_counts_as_new_play() {
    let h = playing(&["a"]).await;
    let first_message = h.notifier.sent()[0].1;

    assert_eq!(h.orchestrator.replay(CHAT).await.unwrap(), PlayOutcome::Playing);

    assert_eq!(h.transport.started_tracks(), vec!["a", "a"]);
    assert!(h.notifier.deleted().contains(&(CHAT, first_message)));
    assert_eq!(h.wait_for_plays(CHAT, "a", 2).await, 2);
}

// ============================================================================
// Queue operations
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_add_and_advance() {
    let h = playing(&["a", "b"]).await;

    let (added, advanced) = tokio::join!(
        h.orchestrator.add(CHAT, track("c")),
        h.orchestrator.play_next(CHAT),
    );

    assert!(matches!(added, Enqueued::QueuedAt(_)));
    assert_eq!(advanced.unwrap(), PlayOutcome::Playing);
    assert_eq!(h.queue_ids(CHAT).await, vec!["b", "c"]);
}

#[tokio::test]
async fn test_play_queued_now_promotes_once() {
    let h = playing(&["a", "b", "c", "d"]).await;

    assert!(h.orchestrator.play_queued_now(CHAT, "d").await.unwrap());
    assert_eq!(h.queue_ids(CHAT).await, vec!["d", "b", "c"]);

    // "a" was consumed by the promotion
    assert!(!h.orchestrator.play_queued_now(CHAT, "a").await.unwrap());
    // Already current: nothing restarts
    assert!(h.orchestrator.play_queued_now(CHAT, "d").await.unwrap());
    assert_eq!(h.transport.started_tracks(), vec!["a", "d"]);
}

#[tokio::test]
async fn test_force_play_preempts_queue() {
    let h = playing(&["a", "b"]).await;

    assert_eq!(h.orchestrator.force_play(CHAT, track("x")).await.unwrap(), PlayOutcome::Playing);

    assert_eq!(h.queue_ids(CHAT).await, vec!["x", "b"]);
    assert_eq!(h.transport.started_tracks(), vec!["a", "x"]);
}

#[tokio::test]
async fn test_shuffle_keeps_head() {
    let h = playing(&["a", "b", "c", "d", "e", "f"]).await;
    let mut rng = StdRng::seed_from_u64(7);

    assert!(h.orchestrator.shuffle_with(CHAT, &mut rng).await);

    let ids = h.queue_ids(CHAT).await;
    assert_eq!(ids[0], "a");
    let all: HashSet<&str> = ids.iter().map(String::as_str).collect();
    assert_eq!(all, HashSet::from(["a", "b", "c", "d", "e", "f"]));
}

#[tokio::test]
async fn test_shuffle_needs_two_upcoming_tracks() {
    let h = playing(&["a", "b"]).await;
    assert!(!h.orchestrator.shuffle(CHAT).await);
    assert_eq!(h.queue_ids(CHAT).await, vec!["a", "b"]);
}

#[tokio::test]
async fn test_queued_notice_becomes_now_playing() {
    let h = playing(&["a"]).await;

    assert_eq!(h.orchestrator.play(CHAT, track("b")).await.unwrap(), Enqueued::QueuedAt(1));
    let (_, notice_id, text) = h.notifier.sent().last().cloned().unwrap();
    assert!(text.contains("Added to queue at #1"));

    h.orchestrator.play_next(CHAT).await.unwrap();

    let edited = h.notifier.edited();
    assert_eq!(edited.len(), 1);
    assert_eq!(edited[0].1, notice_id);
    assert!(edited[0].2.contains("Now playing"));
}

#[tokio::test]
async fn test_queue_summary_totals() {
    let h = playing(&["a", "b"]).await;

    let summary = h.orchestrator.queue_summary(CHAT).await;
    assert_eq!(summary.tracks, 2);
    assert_eq!(summary.total_seconds, 360);
    assert_eq!(summary.total_display, "6:00");
}

// ============================================================================
// Transport updates and startup recovery
// ============================================================================

#[tokio::test]
async fn test_router_advances_on_stream_end() {
    let h = playing(&["a", "b"]).await;
    let (tx, rx) = mpsc::unbounded_channel();
    let _router = EventRouter::spawn(Arc::clone(&h.orchestrator), rx);

    tx.send(TransportUpdate::StreamEnded { chat_id: CHAT }).unwrap();

    for _ in 0..100 {
        if h.current_id(CHAT).await.as_deref() == Some("b") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.current_id(CHAT).await.as_deref(), Some("b"));
    assert_eq!(h.transport.started_tracks(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_router_lane_reopens_after_idle() {
    let h = playing(&["a", "b"]).await;
    let (tx, rx) = mpsc::unbounded_channel();
    let _router = EventRouter::new(Arc::clone(&h.orchestrator))
        .with_idle_timeout(Duration::from_millis(20))
        .run(rx);

    // Opens the lane; a no-op for an idle chat
    tx.send(TransportUpdate::StreamEnded { chat_id: 7 }).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(TransportUpdate::StreamEnded { chat_id: CHAT }).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(TransportUpdate::StreamEnded { chat_id: CHAT }).unwrap();

    for _ in 0..100 {
        if h.orchestrator.session(CHAT).await.is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.transport.started_tracks(), vec!["a", "b"]);
    assert!(h.orchestrator.session(CHAT).await.is_none());
}

#[tokio::test]
async fn test_idle_chats_are_forgotten() {
    let h = playing(&["a", "b"]).await;
    h.orchestrator.play(7, track("x")).await.unwrap();
    assert_eq!(h.orchestrator.tracked_chats().await, 2);

    // Reads of unknown chats leave nothing behind
    assert!(h.queue_ids(99).await.is_empty());
    assert_eq!(h.orchestrator.play_next(99).await.unwrap(), PlayOutcome::Inactive);
    assert_eq!(h.orchestrator.tracked_chats().await, 2);

    h.orchestrator.stop(CHAT).await.unwrap();
    assert_eq!(h.orchestrator.tracked_chats().await, 1);

    h.orchestrator.on_call_closed(7, CloseReason::VoiceChatClosed).await;
    assert_eq!(h.orchestrator.tracked_chats().await, 0);
}

#[tokio::test]
async fn test_recover_stale_calls() {
    let h = Harness::new().await;
    h.store.set_active_flag(42, true).await.unwrap();

    assert_eq!(h.orchestrator.recover_stale_calls().await.unwrap(), 1);

    assert!(!h.store.get_active_flag(42).await.unwrap());
    assert_eq!(h.transport.leave_count(42), 1);
    assert_eq!(h.orchestrator.recover_stale_calls().await.unwrap(), 0);
}
