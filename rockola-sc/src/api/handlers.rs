//! HTTP handlers for the session coordinator API

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rockola_common::model::VoteCounts;
use rockola_common::Error;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::types::{
    EnqueueRequest, EnqueueResponse, QueueResponse, ReorderRequest, SeekRequest, VolumeRequest,
    VoteRequest,
};
use super::AppState;

/// Error wrapper mapping the taxonomy onto HTTP statuses
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::DeviceInit(_) => StatusCode::BAD_GATEWAY,
            Error::DeviceTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ===== Queue =====

pub async fn get_queue(State(state): State<AppState>) -> ApiResult<Json<QueueResponse>> {
    let items = state.coordinator.queue().await?;
    let count = items.len();
    Ok(Json(QueueResponse { items, count }))
}

pub async fn enqueue(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> ApiResult<(StatusCode, Json<EnqueueResponse>)> {
    let item = state
        .coordinator
        .enqueue(request.track, &request.contributor)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(EnqueueResponse {
            id: item.id.to_string(),
            position: item.position.unwrap_or(1),
        }),
    ))
}

pub async fn enqueue_play_now(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let item = state
        .coordinator
        .enqueue_and_play_now(request.track, &request.contributor)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": item.id }))))
}

pub async fn dequeue(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.coordinator.remove(item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reorder(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(request): Json<ReorderRequest>,
) -> ApiResult<Json<QueueResponse>> {
    if request.position < 1 {
        return Err(Error::BadRequest("position must be 1 or greater".to_string()).into());
    }
    let items = state.coordinator.reorder(item_id, request.position).await?;
    let count = items.len();
    Ok(Json(QueueResponse { items, count }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<i64>,
}

pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<QueueResponse>> {
    let items = state
        .coordinator
        .history(query.limit.unwrap_or(50).clamp(1, 500))
        .await?;
    let count = items.len();
    Ok(Json(QueueResponse { items, count }))
}

// ===== Playback =====

pub async fn get_playback(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.coordinator.snapshot().await;
    Json(serde_json::to_value(snapshot).unwrap_or_else(|_| json!({})))
}

/// Resume when something is current, otherwise start the queue
pub async fn play(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let snapshot = state.coordinator.snapshot().await;
    if snapshot.current_item_id.is_some() {
        state.coordinator.resume().await;
        Ok(Json(json!({ "resumed": true })))
    } else {
        let started = state.coordinator.play_next().await?;
        Ok(Json(json!({ "started": started.map(|i| i.id) })))
    }
}

pub async fn pause(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.coordinator.pause().await;
    Json(json!({ "paused": true }))
}

pub async fn skip(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let next = state.coordinator.skip_to_next().await?;
    Ok(Json(json!({ "started": next.map(|i| i.id) })))
}

pub async fn seek(
    State(state): State<AppState>,
    Json(request): Json<SeekRequest>,
) -> Json<serde_json::Value> {
    state.coordinator.seek(request.position_ms).await;
    Json(json!({ "position": request.position_ms }))
}

pub async fn set_volume(
    State(state): State<AppState>,
    Json(request): Json<VolumeRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if !(0.0..=1.0).contains(&request.volume) {
        return Err(Error::BadRequest("volume must be between 0.0 and 1.0".to_string()).into());
    }
    state.coordinator.set_volume(request.volume).await;
    Ok(Json(json!({ "volume": request.volume })))
}

// ===== Votes =====

pub async fn vote_like(
    State(state): State<AppState>,
    Json(request): Json<VoteRequest>,
) -> Json<VoteCounts> {
    Json(state.coordinator.vote_like(&request.contributor).await)
}

pub async fn vote_skip(
    State(state): State<AppState>,
    Json(request): Json<VoteRequest>,
) -> Json<VoteCounts> {
    Json(state.coordinator.vote_skip(&request.contributor).await)
}

// ===== Events =====

pub async fn sse_handler(State(state): State<AppState>) -> impl IntoResponse {
    let sse: Sse<_> = state.room.handle_sse_connection();
    sse
}
