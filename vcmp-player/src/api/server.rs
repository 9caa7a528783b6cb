//! HTTP server setup and routing

use crate::db::SessionStore;
use crate::error::{Error, Result};
use crate::playback::PlaybackOrchestrator;
use crate::state::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub orchestrator: Arc<PlaybackOrchestrator>,
    pub store: Arc<dyn SessionStore>,
    /// Longest track the `play` endpoints accept
    pub duration_limit_secs: u64,
}

/// Build the router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    use super::handlers;

    let chat_routes = Router::new()
        // Enqueue and play
        .route("/play", post(handlers::play))
        .route("/playforce", post(handlers::play_force))
        .route("/queue/:track_id/play", post(handlers::play_queued_now))

        // Transport control
        .route("/skip", post(handlers::skip))
        .route("/pause", post(handlers::pause))
        .route("/resume", post(handlers::resume))
        .route("/replay", post(handlers::replay))
        .route("/stop", post(handlers::stop))
        .route("/seek", post(handlers::seek))

        // Queue and settings
        .route("/shuffle", post(handlers::shuffle))
        .route(
            "/loop",
            get(handlers::get_loop_mode)
                .post(handlers::cycle_loop_mode)
                .put(handlers::set_loop_mode),
        )
        .route("/settings", get(handlers::get_settings).put(handlers::update_settings))
        .route("/queue", get(handlers::get_queue))
        .route("/state", get(handlers::get_state));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ping", get(handlers::ping))
        .route("/calls/active", get(handlers::active_calls))
        .route("/stats/top", get(handlers::top_tracks))
        .route("/events", get(super::sse::event_stream))
        .nest("/chats/:chat_id", chat_routes)
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` resolves
pub async fn run<F>(port: u16, ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
