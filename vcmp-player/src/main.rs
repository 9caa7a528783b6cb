//! VCMP Player (vcmp-player) - Main entry point
//!
//! Wires the orchestrator to the loopback transport, the cached media
//! resolver and the SQLite store, then serves the HTTP control API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vcmp_common::config::{resolve_root_folder, ROOT_FOLDER_ENV};
use vcmp_player::api::{self, AppContext};
use vcmp_player::config::Config;
use vcmp_player::db::{SessionStore, SqliteStore};
use vcmp_player::notifier::EventNotifier;
use vcmp_player::playback::{EventRouter, PlaybackOrchestrator};
use vcmp_player::resolver::CachedResolver;
use vcmp_player::state::SharedState;
use vcmp_player::transport::{LoopbackTransport, TransportPool, VoiceTransport};

/// Command-line arguments for vcmp-player
#[derive(Parser, Debug)]
#[command(name = "vcmp-player")]
#[command(about = "Voice-call music player: per-chat queues and playback sessions")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "VCMP_PORT")]
    port: Option<u16>,

    /// Root folder holding the database and media cache
    #[arg(short, long, env = ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vcmp_player=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let root_folder = resolve_root_folder(
        args.root_folder.as_deref(),
        ROOT_FOLDER_ENV,
        args.config.as_deref(),
    );
    let mut config = Config::load(args.config.as_deref())
        .context("Failed to load configuration")?
        .rooted_at(&root_folder);
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate().context("Invalid configuration")?;

    info!("Starting VCMP Player on port {}", config.port);
    info!("Root folder: {}", root_folder.display());

    let db_pool = vcmp_common::db::init_database(&config.database_file)
        .await
        .context("Failed to initialize database")?;
    let store: Arc<dyn SessionStore> = Arc::new(SqliteStore::new(db_pool));

    let state = Arc::new(SharedState::new(config.event_buffer));

    // Transport clients report into one channel drained by the event router
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let clients: Vec<Arc<dyn VoiceTransport>> = (1..=config.assistants)
        .map(|num| {
            Arc::new(
                LoopbackTransport::new(format!("assistant-{}", num), updates_tx.clone())
                    .with_latency(config.loopback_latency_ms),
            ) as Arc<dyn VoiceTransport>
        })
        .collect();
    drop(updates_tx);
    info!("{} transport client(s) ready", clients.len());

    let orchestrator = Arc::new(PlaybackOrchestrator::new(
        TransportPool::new(clients, Arc::clone(&store)),
        Arc::new(CachedResolver::from_config(&config)),
        Arc::clone(&store),
        Arc::new(EventNotifier::new(Arc::clone(&state))),
        Arc::clone(&state),
    ));

    let recovered = orchestrator
        .recover_stale_calls()
        .await
        .context("Failed to recover stale calls")?;
    if recovered > 0 {
        info!("Cleaned up {} call(s) left active by the previous run", recovered);
    }

    let router = EventRouter::spawn(Arc::clone(&orchestrator), updates_rx);

    let ctx = AppContext {
        state,
        orchestrator,
        store,
        duration_limit_secs: config.duration_limit_secs,
    };

    api::run(config.port, ctx, shutdown_signal())
        .await
        .context("Server error")?;

    router.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
