//! HTTP request handlers
//!
//! Thin adapters from HTTP to the orchestrator. Every per-chat route runs
//! through the orchestrator's per-chat serialization; handlers never touch
//! queues directly.

use crate::api::server::AppContext;
use crate::db::TopTrack;
use crate::error::Error;
use crate::playback::{Enqueued, PlayOutcome, QueueSummary, SessionSnapshot, Track};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info, warn};
use vcmp_common::events::LoopMode;
use vcmp_common::ChatId;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<StatusResponse>)>;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    uptime_secs: u64,
    active_calls: usize,
    /// Chats with a queue, a session or a command in flight
    tracked_chats: usize,
    recoveries: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

/// One track as submitted by a client
#[derive(Debug, Clone, Deserialize)]
pub struct TrackRequest {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub channel_name: String,
    pub duration_seconds: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub thumbnail: String,
    /// Falls back to the chat's video mode setting
    #[serde(default)]
    pub video: Option<bool>,
    #[serde(default)]
    pub requested_by: String,
    #[serde(default)]
    pub requested_by_id: i64,
    /// Local file; makes the track direct (never resolved)
    #[serde(default)]
    pub local_path: Option<PathBuf>,
}

impl TrackRequest {
    fn into_track(self, default_video: bool) -> Track {
        let base = match self.local_path {
            Some(path) => Track::direct(self.id, self.title, self.duration_seconds, path),
            None => Track::new(self.id, self.title, self.duration_seconds),
        };
        Track {
            channel_name: self.channel_name,
            thumbnail: self.thumbnail,
            ..base
                .with_url(self.url)
                .with_video(self.video.unwrap_or(default_video))
                .with_requester(self.requested_by, self.requested_by_id)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    /// One track, or a playlist
    pub tracks: Vec<TrackRequest>,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    results: Vec<Enqueued>,
    /// Ids refused for exceeding the duration limit
    skipped: Vec<String>,
    state: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct OutcomeResponse {
    outcome: PlayOutcome,
    state: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ChangedResponse {
    changed: bool,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub delta_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct SeekResponse {
    position_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoopModeBody {
    pub mode: LoopMode,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    tracks: Vec<Track>,
    summary: QueueSummary,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    admin_only: bool,
    video_mode: bool,
    loop_mode: LoopMode,
}

#[derive(Debug, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub admin_only: Option<bool>,
    #[serde(default)]
    pub video_mode: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ActiveCallsResponse {
    chats: Vec<ChatId>,
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    ping_ms: f64,
}

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    #[serde(default)]
    pub chat_id: Option<ChatId>,
    #[serde(default = "default_top_limit")]
    pub limit: u32,
}

fn default_top_limit() -> u32 {
    10
}

fn error_response(err: Error) -> (StatusCode, Json<StatusResponse>) {
    let status = match &err {
        Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::SeekUnavailable | Error::InvalidState(_) => StatusCode::CONFLICT,
        Error::MediaUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::TransportNoActiveCall
        | Error::TransportNoAudioSource
        | Error::TransportServerError(_)
        | Error::TransportFileMissing(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", err);
    } else {
        warn!("Request refused: {}", err);
    }
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", err),
        }),
    )
}

// ============================================================================
// Service Endpoints
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "vcmp_player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: ctx.state.uptime_secs(),
        active_calls: ctx.orchestrator.active_chats().len(),
        tracked_chats: ctx.orchestrator.tracked_chats().await,
        recoveries: ctx.state.recoveries(),
    })
}

/// GET /ping - Mean transport latency
pub async fn ping(State(ctx): State<AppContext>) -> Json<PingResponse> {
    Json(PingResponse {
        ping_ms: ctx.orchestrator.ping().await,
    })
}

/// GET /calls/active - Chats with an active session
pub async fn active_calls(State(ctx): State<AppContext>) -> Json<ActiveCallsResponse> {
    Json(ActiveCallsResponse {
        chats: ctx.orchestrator.active_chats(),
    })
}

/// GET /stats/top - Most played tracks
pub async fn top_tracks(
    State(ctx): State<AppContext>,
    Query(query): Query<TopQuery>,
) -> ApiResult<Vec<TopTrack>> {
    let limit = query.limit.clamp(1, 100);
    ctx.store
        .top_tracks(query.chat_id, limit)
        .await
        .map(Json)
        .map_err(error_response)
}

// ============================================================================
// Enqueue and Play
// ============================================================================

/// POST /chats/:chat_id/play - Enqueue one track or a playlist
pub async fn play(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
    Json(request): Json<PlayRequest>,
) -> ApiResult<PlayResponse> {
    if request.tracks.is_empty() {
        return Err(error_response(Error::BadRequest("no tracks given".to_string())));
    }

    let default_video = ctx.store.get_video_mode(chat_id).await.unwrap_or(false);
    let limit = ctx.duration_limit_secs;
    let single = request.tracks.len() == 1;

    let (accepted, refused): (Vec<_>, Vec<_>) = request
        .tracks
        .into_iter()
        .partition(|t| limit == 0 || t.duration_seconds <= limit);
    let skipped: Vec<String> = refused.into_iter().map(|t| t.id).collect();

    if accepted.is_empty() {
        let reason = if single {
            format!("track is longer than the {}s limit", limit)
        } else {
            "every track exceeds the duration limit".to_string()
        };
        return Err(error_response(Error::BadRequest(reason)));
    }

    let mut tracks: Vec<Track> = accepted
        .into_iter()
        .map(|t| t.into_track(default_video))
        .collect();

    info!("Play request for chat {}: {} track(s)", chat_id, tracks.len());
    let results = if tracks.len() == 1 {
        let track = tracks.remove(0);
        vec![ctx.orchestrator.play(chat_id, track).await.map_err(error_response)?]
    } else {
        ctx.orchestrator
            .enqueue_many(chat_id, tracks)
            .await
            .map_err(error_response)?
    };

    Ok(Json(PlayResponse {
        results,
        skipped,
        state: ctx.orchestrator.session_snapshot(chat_id).await,
    }))
}

/// POST /chats/:chat_id/playforce - Play a track now, ahead of the queue
pub async fn play_force(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
    Json(request): Json<TrackRequest>,
) -> ApiResult<OutcomeResponse> {
    let limit = ctx.duration_limit_secs;
    if limit > 0 && request.duration_seconds > limit {
        return Err(error_response(Error::BadRequest(format!(
            "track is longer than the {}s limit",
            limit
        ))));
    }

    let default_video = ctx.store.get_video_mode(chat_id).await.unwrap_or(false);
    let outcome = ctx
        .orchestrator
        .force_play(chat_id, request.into_track(default_video))
        .await
        .map_err(error_response)?;
    outcome_response(&ctx, chat_id, outcome).await
}

/// POST /chats/:chat_id/queue/:track_id/play - Promote a queued track
pub async fn play_queued_now(
    State(ctx): State<AppContext>,
    Path((chat_id, track_id)): Path<(ChatId, String)>,
) -> ApiResult<StatusResponse> {
    let played = ctx
        .orchestrator
        .play_queued_now(chat_id, &track_id)
        .await
        .map_err(error_response)?;
    if !played {
        return Err(error_response(Error::NotFound(format!(
            "track {} is no longer queued in chat {}",
            track_id, chat_id
        ))));
    }
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
    }))
}

// ============================================================================
// Transport Control
// ============================================================================

async fn outcome_response(
    ctx: &AppContext,
    chat_id: ChatId,
    outcome: PlayOutcome,
) -> ApiResult<OutcomeResponse> {
    Ok(Json(OutcomeResponse {
        outcome,
        state: ctx.orchestrator.session_snapshot(chat_id).await,
    }))
}

/// POST /chats/:chat_id/skip
pub async fn skip(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
) -> ApiResult<OutcomeResponse> {
    let outcome = ctx.orchestrator.play_next(chat_id).await.map_err(error_response)?;
    outcome_response(&ctx, chat_id, outcome).await
}

/// POST /chats/:chat_id/replay
pub async fn replay(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
) -> ApiResult<OutcomeResponse> {
    let outcome = ctx.orchestrator.replay(chat_id).await.map_err(error_response)?;
    outcome_response(&ctx, chat_id, outcome).await
}

/// POST /chats/:chat_id/pause
pub async fn pause(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
) -> ApiResult<ChangedResponse> {
    let changed = ctx.orchestrator.pause(chat_id).await.map_err(error_response)?;
    Ok(Json(ChangedResponse { changed }))
}

/// POST /chats/:chat_id/resume
pub async fn resume(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
) -> ApiResult<ChangedResponse> {
    let changed = ctx.orchestrator.resume(chat_id).await.map_err(error_response)?;
    Ok(Json(ChangedResponse { changed }))
}

/// POST /chats/:chat_id/stop
pub async fn stop(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
) -> ApiResult<StatusResponse> {
    ctx.orchestrator.stop(chat_id).await.map_err(error_response)?;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
    }))
}

/// POST /chats/:chat_id/seek - Relative seek in seconds
pub async fn seek(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
    Json(request): Json<SeekRequest>,
) -> ApiResult<SeekResponse> {
    let position_ms = ctx
        .orchestrator
        .seek(chat_id, request.delta_seconds)
        .await
        .map_err(error_response)?;
    Ok(Json(SeekResponse { position_ms }))
}

// ============================================================================
// Queue and Settings
// ============================================================================

/// POST /chats/:chat_id/shuffle
pub async fn shuffle(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
) -> Json<ChangedResponse> {
    Json(ChangedResponse {
        changed: ctx.orchestrator.shuffle(chat_id).await,
    })
}

/// GET /chats/:chat_id/loop
pub async fn get_loop_mode(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
) -> ApiResult<LoopModeBody> {
    let mode = ctx.orchestrator.loop_mode(chat_id).await.map_err(error_response)?;
    Ok(Json(LoopModeBody { mode }))
}

/// POST /chats/:chat_id/loop - Cycle to the next loop mode
pub async fn cycle_loop_mode(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
) -> ApiResult<LoopModeBody> {
    let mode = ctx
        .orchestrator
        .cycle_loop_mode(chat_id)
        .await
        .map_err(error_response)?;
    Ok(Json(LoopModeBody { mode }))
}

/// PUT /chats/:chat_id/loop
pub async fn set_loop_mode(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
    Json(body): Json<LoopModeBody>,
) -> ApiResult<LoopModeBody> {
    ctx.orchestrator
        .set_loop_mode(chat_id, body.mode)
        .await
        .map_err(error_response)?;
    Ok(Json(body))
}

/// GET /chats/:chat_id/settings
pub async fn get_settings(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
) -> ApiResult<SettingsResponse> {
    settings_response(&ctx, chat_id).await.map_err(error_response)
}

/// PUT /chats/:chat_id/settings - Update any subset of the flags
pub async fn update_settings(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<SettingsResponse> {
    if let Some(enabled) = update.admin_only {
        ctx.store
            .set_admin_only(chat_id, enabled)
            .await
            .map_err(error_response)?;
    }
    if let Some(enabled) = update.video_mode {
        ctx.store
            .set_video_mode(chat_id, enabled)
            .await
            .map_err(error_response)?;
    }
    settings_response(&ctx, chat_id).await.map_err(error_response)
}

async fn settings_response(
    ctx: &AppContext,
    chat_id: ChatId,
) -> crate::error::Result<Json<SettingsResponse>> {
    Ok(Json(SettingsResponse {
        admin_only: ctx.store.get_admin_only(chat_id).await?,
        video_mode: ctx.store.get_video_mode(chat_id).await?,
        loop_mode: ctx.orchestrator.loop_mode(chat_id).await?,
    }))
}

/// GET /chats/:chat_id/queue - Tracks in playback order with totals
pub async fn get_queue(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
) -> Json<QueueResponse> {
    Json(QueueResponse {
        tracks: ctx.orchestrator.snapshot(chat_id).await,
        summary: ctx.orchestrator.queue_summary(chat_id).await,
    })
}

/// GET /chats/:chat_id/state
pub async fn get_state(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<ChatId>,
) -> Json<SessionSnapshot> {
    Json(ctx.orchestrator.session_snapshot(chat_id).await)
}
