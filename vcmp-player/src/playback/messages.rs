//! Chat message texts posted by the orchestrator

use crate::transport::TransportError;

use super::track::Track;

pub fn now_playing(track: &Track) -> String {
    let kind = if track.is_video { "video" } else { "audio" };
    let mut text = format!("Now playing ({}): {} [{}]", kind, track.title, track.duration_display);
    if !track.requested_by.is_empty() {
        text.push_str(&format!("\nRequested by {}", track.requested_by));
    }
    text
}

pub fn queued(track: &Track, position: usize) -> String {
    format!(
        "Added to queue at #{}: {} [{}]",
        position, track.title, track.duration_display
    )
}

/// Resolver failure of the track being started; nothing plays
pub fn media_unavailable(track: &Track) -> String {
    format!("Could not fetch {}.", track.title)
}

/// Resolver failure after an advance; the session stops
pub fn file_not_found(track: &Track) -> String {
    format!("File not found for {}; stopping playback.", track.title)
}

pub fn transport_failure(track: &Track, err: &TransportError) -> String {
    match err {
        TransportError::FileMissing(_) => {
            format!("Media file for {} is missing; skipping to the next track.", track.title)
        }
        TransportError::NoAudioSource => {
            format!("No audio source in {}; skipping to the next track.", track.title)
        }
        TransportError::NoActiveCall => {
            "No active voice chat found. Start a voice chat and try again.".to_string()
        }
        TransportError::Server(msg) => format!("Voice chat error: {}. Playback stopped.", msg),
    }
}
