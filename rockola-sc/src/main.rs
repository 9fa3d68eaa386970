//! Session Coordinator (rockola-sc) - Main entry point
//!
//! Hosts one venue's queue/playback coordination engine behind a REST/SSE
//! API: authoritative queue, current-item pointer, end-of-track
//! advancement, session restoration, and venue-wide event fan-out.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rockola_common::config::{default_database_path, load_file_config, resolve_setting};
use rockola_sc::api;
use rockola_sc::device::{
    CredentialsProvider, DeviceAdapter, DeviceConfig, HttpCredentialsProvider,
    LocalCredentialsProvider, SimulatedEngine,
};
use rockola_sc::fanout::VenueRooms;
use rockola_sc::{Coordinator, CoordinatorConfig, SharedState};

/// Command-line arguments for rockola-sc
#[derive(Parser, Debug)]
#[command(name = "rockola-sc")]
#[command(about = "Venue session coordinator for rockola")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5790", env = "ROCKOLA_SC_PORT")]
    port: u16,

    /// Venue identifier this session drives
    #[arg(short, long, env = "ROCKOLA_VENUE")]
    venue: Option<String>,

    /// Path to the sqlite database
    #[arg(short, long, env = "ROCKOLA_DATABASE")]
    database: Option<PathBuf>,

    /// Base URL of the device credentials endpoint
    #[arg(long, env = "ROCKOLA_CREDENTIALS_ENDPOINT")]
    credentials_endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rockola_sc=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let file_config = load_file_config().context("Failed to load config file")?;

    let venue_id = resolve_setting(
        args.venue.as_deref(),
        "ROCKOLA_VENUE",
        file_config.venue_id.as_deref(),
    )
    .context("No venue configured (use --venue, ROCKOLA_VENUE, or the config file)")?;

    let database = args
        .database
        .clone()
        .or_else(|| file_config.database.as_deref().map(PathBuf::from))
        .unwrap_or_else(default_database_path);

    let credentials_endpoint = resolve_setting(
        args.credentials_endpoint.as_deref(),
        "ROCKOLA_CREDENTIALS_ENDPOINT",
        file_config.credentials_endpoint.as_deref(),
    );

    info!("Starting rockola session coordinator for venue {}", venue_id);
    info!("Database: {}", database.display());

    let db = rockola_common::db::init_database(&database)
        .await
        .context("Failed to initialize database")?;

    let rooms = VenueRooms::new(256);
    let room = rooms.join(&venue_id).await;
    let state = Arc::new(SharedState::new());

    let credentials: Arc<dyn CredentialsProvider> = match credentials_endpoint {
        Some(endpoint) => {
            info!("Using credentials endpoint {}", endpoint);
            Arc::new(HttpCredentialsProvider::new(endpoint))
        }
        None => {
            info!("No credentials endpoint configured, using session-local tokens");
            Arc::new(LocalCredentialsProvider)
        }
    };

    let engine = SimulatedEngine::spawn();
    let device = Arc::new(DeviceAdapter::new(
        engine,
        credentials,
        DeviceConfig::default(),
    ));
    device
        .initialize(&venue_id)
        .await
        .context("Failed to initialize playback device")?;
    state.set_device_ready(true).await;

    let coordinator = Arc::new(Coordinator::new(
        venue_id.clone(),
        db,
        Arc::clone(&device),
        Arc::clone(&state),
        room.clone(),
        CoordinatorConfig::default(),
    ));

    // Attach restores any playback already running venue-wide
    coordinator
        .attach()
        .await
        .context("Failed to attach session")?;
    info!("Session attached");

    let app_state = api::AppState {
        coordinator: Arc::clone(&coordinator),
        room,
        venue_id,
        port: args.port,
    };
    let app = api::create_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    coordinator.detach().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
