//! Track: one playable queue entry
//!
//! A track is either resolver-backed (identified by a resolver key and
//! downloaded on demand) or direct (the file was supplied by the chat and
//! is already on disk). Both flow through the same queue and orchestrator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vcmp_common::human_time::format_clock;
use vcmp_common::MessageId;

/// Where the playable file comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    /// Resolved lazily through the media resolver
    #[default]
    Resolver,
    /// Supplied directly with a local path
    Direct,
}

/// One playable item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Opaque source key (resolver id or file unique id)
    pub id: String,
    pub title: String,
    pub channel_name: String,
    /// Display form of the duration, e.g. `3:25`
    pub duration_display: String,
    pub duration_seconds: u64,
    /// Canonical link for display
    pub url: String,
    pub thumbnail: String,
    /// Stream with a video track
    pub is_video: bool,
    /// Display name or mention of the requester
    pub requested_by: String,
    /// Numeric id of the requester, for statistics
    pub requested_by_id: i64,
    pub source: TrackSource,
    /// Message currently representing this track in the chat
    #[serde(default)]
    pub ui_message_id: Option<MessageId>,
    /// Resolved playable file
    #[serde(default)]
    pub local_path: Option<PathBuf>,
}

impl Track {
    /// Resolver-backed track with no requester or UI state yet
    pub fn new(id: impl Into<String>, title: impl Into<String>, duration_seconds: u64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            channel_name: String::new(),
            duration_display: format_clock(duration_seconds),
            duration_seconds,
            url: String::new(),
            thumbnail: String::new(),
            is_video: false,
            requested_by: String::new(),
            requested_by_id: 0,
            source: TrackSource::Resolver,
            ui_message_id: None,
            local_path: None,
        }
    }

    /// Direct track whose file is already on disk
    pub fn direct(
        id: impl Into<String>,
        title: impl Into<String>,
        duration_seconds: u64,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: TrackSource::Direct,
            local_path: Some(path.into()),
            ..Self::new(id, title, duration_seconds)
        }
    }

    pub fn with_requester(mut self, name: impl Into<String>, user_id: i64) -> Self {
        self.requested_by = name.into();
        self.requested_by_id = user_id;
        self
    }

    pub fn with_video(mut self, is_video: bool) -> Self {
        self.is_video = is_video;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// True when the transport can be handed this track without resolving
    pub fn is_resolved(&self) -> bool {
        self.local_path.is_some()
    }

    pub fn duration_ms(&self) -> u64 {
        vcmp_common::time::secs_to_millis(self.duration_seconds)
    }
}
