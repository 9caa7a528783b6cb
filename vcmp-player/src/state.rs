//! Shared player state
//!
//! Process-wide pieces every component touches: the event bus feeding SSE
//! and counters surfaced by the health endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::broadcast;
use vcmp_common::events::{EventBus, VcmpEvent};

/// Shared state accessible by all components
pub struct SharedState {
    events: EventBus,

    started_at: Instant,

    /// Playback failures the orchestrator recovered from (skip or stop)
    recoveries_total: AtomicU64,
}

impl SharedState {
    pub fn new(event_buffer: usize) -> Self {
        Self {
            events: EventBus::new(event_buffer),
            started_at: Instant::now(),
            recoveries_total: AtomicU64::new(0),
        }
    }

    /// Broadcast an event to all SSE listeners
    pub fn broadcast_event(&self, event: VcmpEvent) {
        // No receivers is OK
        self.events.emit_lossy(event);
    }

    /// Subscribe to event stream for SSE
    pub fn subscribe_events(&self) -> broadcast::Receiver<VcmpEvent> {
        self.events.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn increment_recoveries(&self) {
        self.recoveries_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn recoveries(&self) -> u64 {
        self.recoveries_total.load(Ordering::Relaxed)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(100)
    }
}
