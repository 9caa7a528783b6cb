//! In-process transport that streams nothing
//!
//! Keeps a clock per chat and reports `StreamEnded` once the track's
//! duration has elapsed. Used when no voice-call backend is attached and
//! by the integration tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use vcmp_common::ChatId;

use super::{StreamOptions, TransportError, TransportUpdate, VoiceTransport};

struct LoopbackStream {
    /// Position at the last pause/start, in milliseconds
    offset_ms: u64,
    /// Set while the clock runs
    running_since: Option<Instant>,
    duration_ms: Option<u64>,
    end_timer: Option<JoinHandle<()>>,
}

impl LoopbackStream {
    fn position_ms(&self) -> u64 {
        let elapsed = self
            .running_since
            .map(|since| since.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let position = self.offset_ms.saturating_add(elapsed);
        match self.duration_ms {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.end_timer.take() {
            timer.abort();
        }
    }
}

/// Clock-driven stand-in for a voice-call client
pub struct LoopbackTransport {
    name: String,
    streams: Mutex<HashMap<ChatId, LoopbackStream>>,
    updates: mpsc::UnboundedSender<TransportUpdate>,
    latency_ms: f64,
}

impl LoopbackTransport {
    pub fn new(name: impl Into<String>, updates: mpsc::UnboundedSender<TransportUpdate>) -> Self {
        Self {
            name: name.into(),
            streams: Mutex::new(HashMap::new()),
            updates,
            latency_ms: 0.0,
        }
    }

    /// Latency reported by `ping`
    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    fn lock_streams(&self) -> std::sync::MutexGuard<'_, HashMap<ChatId, LoopbackStream>> {
        // A poisoned map only means a panicking test thread; the data is still usable
        self.streams.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn schedule_end(&self, chat_id: ChatId, stream: &mut LoopbackStream) {
        stream.cancel_timer();
        let Some(duration) = stream.duration_ms else {
            return;
        };
        let remaining = duration.saturating_sub(stream.offset_ms);
        let updates = self.updates.clone();
        stream.end_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(remaining)).await;
            trace!("Loopback stream ended in chat {}", chat_id);
            let _ = updates.send(TransportUpdate::StreamEnded { chat_id });
        }));
    }
}

#[async_trait]
impl VoiceTransport for LoopbackTransport {
    async fn start_stream(
        &self,
        chat_id: ChatId,
        path: &Path,
        options: StreamOptions,
    ) -> Result<(), TransportError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| TransportError::FileMissing(path.display().to_string()))?;
        if metadata.len() == 0 {
            return Err(TransportError::NoAudioSource);
        }

        let mut stream = LoopbackStream {
            offset_ms: options.seek_ms,
            running_since: Some(Instant::now()),
            duration_ms: options.duration_ms,
            end_timer: None,
        };
        self.schedule_end(chat_id, &mut stream);

        if let Some(mut previous) = self.lock_streams().insert(chat_id, stream) {
            previous.cancel_timer();
        }

        debug!(
            "[{}] streaming {} into chat {} from {}ms (video={})",
            self.name,
            path.display(),
            chat_id,
            options.seek_ms,
            options.video
        );
        Ok(())
    }

    async fn pause(&self, chat_id: ChatId) -> Result<bool, TransportError> {
        let mut streams = self.lock_streams();
        let Some(stream) = streams.get_mut(&chat_id) else {
            return Ok(false);
        };
        if stream.running_since.is_none() {
            return Ok(false);
        }
        stream.offset_ms = stream.position_ms();
        stream.running_since = None;
        stream.cancel_timer();
        Ok(true)
    }

    async fn resume(&self, chat_id: ChatId) -> Result<bool, TransportError> {
        let mut streams = self.lock_streams();
        let Some(stream) = streams.get_mut(&chat_id) else {
            return Ok(false);
        };
        if stream.running_since.is_some() {
            return Ok(false);
        }
        stream.running_since = Some(Instant::now());
        self.schedule_end(chat_id, stream);
        Ok(true)
    }

    async fn position(&self, chat_id: ChatId) -> Result<Option<u64>, TransportError> {
        Ok(self.lock_streams().get(&chat_id).map(LoopbackStream::position_ms))
    }

    async fn leave_call(&self, chat_id: ChatId, close: bool) -> Result<(), TransportError> {
        if let Some(mut stream) = self.lock_streams().remove(&chat_id) {
            stream.cancel_timer();
        }
        debug!("[{}] left call in chat {} (close={})", self.name, chat_id, close);
        Ok(())
    }

    async fn ping(&self) -> f64 {
        self.latency_ms
    }
}
