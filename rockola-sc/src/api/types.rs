//! API request/response types

use rockola_common::model::{QueueItem, Track};
use serde::{Deserialize, Serialize};

/// Enqueue request body
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnqueueRequest {
    pub track: Track,
    pub contributor: String,
}

/// Enqueue response
#[derive(Debug, Clone, Serialize)]
pub struct EnqueueResponse {
    /// Queue item id
    pub id: String,
    /// Assigned position in the pending queue
    pub position: i64,
}

/// Reorder request body
#[derive(Debug, Clone, Deserialize)]
pub struct ReorderRequest {
    /// Target 1-based position
    pub position: i64,
}

/// Seek request body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeekRequest {
    pub position_ms: u64,
}

/// Volume request body
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeRequest {
    /// Normalized 0.0 to 1.0
    pub volume: f32,
}

/// Vote request body
#[derive(Debug, Clone, Deserialize)]
pub struct VoteRequest {
    pub contributor: String,
}

/// Queue listing response
#[derive(Debug, Clone, Serialize)]
pub struct QueueResponse {
    pub items: Vec<QueueItem>,
    pub count: usize,
}
