//! REST/SSE API for the session coordinator
//!
//! Observers and control surfaces talk to the engine through this router:
//! queue mutations, playback controls, votes, and the venue event stream.

pub mod handlers;
pub mod types;

use axum::{
    extract::State,
    response::Json,
    routing::{delete, get, patch, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::fanout::Room;
use crate::playback::coordinator::Coordinator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub room: Room,
    pub venue_id: String,
    pub port: u16,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // Queue management
                .route("/queue", get(handlers::get_queue))
                .route("/queue", post(handlers::enqueue))
                .route("/queue/play-now", post(handlers::enqueue_play_now))
                .route("/queue/:item_id", delete(handlers::dequeue))
                .route("/queue/:item_id", patch(handlers::reorder))
                .route("/history", get(handlers::get_history))
                // Playback control
                .route("/playback", get(handlers::get_playback))
                .route("/playback/play", post(handlers::play))
                .route("/playback/pause", post(handlers::pause))
                .route("/playback/skip", post(handlers::skip))
                .route("/playback/seek", post(handlers::seek))
                .route("/playback/volume", post(handlers::set_volume))
                // Engagement
                .route("/votes/like", post(handlers::vote_like))
                .route("/votes/skip", post(handlers::vote_skip))
                // Venue event stream
                .route("/events", get(handlers::sse_handler)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "rockola-sc",
        "version": env!("CARGO_PKG_VERSION"),
        "venue": state.venue_id,
        "port": state.port,
    }))
}
