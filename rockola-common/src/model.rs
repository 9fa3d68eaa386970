//! Data model for venue playback sessions
//!
//! Domain types shared across the services. Queue items carry their own
//! durable identity, distinct from the catalog track they reference, so a
//! track can appear in the queue more than once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog track reference embedded in queue items and events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Catalog identifier in the external playback engine
    pub catalog_id: String,
    pub title: String,
    pub artist: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<String>,
}

/// Lifecycle status of a queue item
///
/// At most one item per venue is `Playing` at any instant. `Played` and
/// `Skipped` items form the venue history; `Pending` items form the serve
/// queue, ordered by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Playing,
    Played,
    Skipped,
}

impl ItemStatus {
    /// Database column representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Playing => "playing",
            ItemStatus::Played => "played",
            ItemStatus::Skipped => "skipped",
        }
    }

    /// Parse the database column representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ItemStatus::Pending),
            "playing" => Some(ItemStatus::Playing),
            "played" => Some(ItemStatus::Played),
            "skipped" => Some(ItemStatus::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One enqueued track instance for a venue
///
/// `position` is only meaningful while the item is pending: positions within
/// a venue's pending set are dense, unique, ascending and 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Durable queue item identity (not the catalog track id)
    pub id: Uuid,
    pub venue_id: String,
    pub track: Track,
    /// Who requested this item
    pub contributor: String,
    /// Serve order within the pending set (None once resolved)
    pub position: Option<i64>,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    /// Set when the item leaves the pending set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// What is playing right now, as observed locally
///
/// Ephemeral; the authoritative venue-wide copy lives server-side and local
/// state converges toward it. Consumers always receive the full snapshot and
/// treat each publication as a complete replace, never a merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    /// Current queue item (None when idle)
    pub current_item_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_track: Option<Track>,
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
    /// Output volume, normalized 0.0 to 1.0
    pub volume: f32,
}

impl PlaybackSnapshot {
    /// Empty snapshot: nothing playing, default volume
    pub fn idle() -> Self {
        Self {
            current_item_id: None,
            current_track: None,
            is_playing: false,
            position_ms: 0,
            duration_ms: 0,
            volume: 0.75,
        }
    }

    /// Clamp position into the track duration. Position never exceeds
    /// duration and does not advance while paused; callers apply this after
    /// interpolating.
    pub fn clamp_position(&mut self) {
        if self.duration_ms > 0 && self.position_ms > self.duration_ms {
            self.position_ms = self.duration_ms;
        }
    }
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

/// Engagement counters for the current item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
    pub likes: usize,
    pub skips: usize,
}
