//! Venue event catalog and event bus
//!
//! Every state transition in a venue session is broadcast to all observers
//! as a `VenueEvent`. The wire format is fixed: snake_case event names with
//! camelCase payload fields, matching what the display and control surfaces
//! consume. `queue_update` and `history_update` deliberately carry no
//! payload; observers re-fetch authoritative state instead of applying
//! deltas, which keeps handlers idempotent under at-least-once delivery.

use crate::model::{Track, VoteCounts};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Venue-scoped broadcast event
///
/// Serialized with an internal `type` tag for SSE/JSON transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum VenueEvent {
    /// Full snapshot replace: what is playing venue-wide right now
    PlaybackUpdate {
        establecimiento_id: String,
        current_track: Option<Track>,
        is_playing: bool,
        /// Position in the current track, milliseconds
        position: u64,
        /// Track duration, milliseconds
        duration: u64,
    },

    /// Position tick with no identity change (1 second cadence while playing)
    PlaybackProgress { position: u64, duration: u64 },

    /// Transport-only change (play/pause flip)
    PlaybackStateChange { is_playing: bool, position: u64 },

    /// A new queue item began playing
    TrackStarted {
        #[serde(flatten)]
        track: Track,
    },

    /// External skip request (vote threshold reached or operator action).
    /// The driving session reacts by advancing the queue.
    TrackSkipped { establecimiento_id: String },

    /// Pending queue changed; observers must re-fetch
    QueueUpdate,

    /// History changed; observers must re-fetch
    HistoryUpdate,

    /// Engagement counters for the current item
    VotesUpdate { likes: usize, skips: usize },
}

impl VenueEvent {
    /// Event name as it appears on the wire, for SSE event framing and
    /// subscription filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            VenueEvent::PlaybackUpdate { .. } => "playback_update",
            VenueEvent::PlaybackProgress { .. } => "playback_progress",
            VenueEvent::PlaybackStateChange { .. } => "playback_state_change",
            VenueEvent::TrackStarted { .. } => "track_started",
            VenueEvent::TrackSkipped { .. } => "track_skipped",
            VenueEvent::QueueUpdate => "queue_update",
            VenueEvent::HistoryUpdate => "history_update",
            VenueEvent::VotesUpdate { .. } => "votes_update",
        }
    }

    /// Build a `votes_update` from tallied counts
    pub fn votes(counts: VoteCounts) -> Self {
        VenueEvent::VotesUpdate {
            likes: counts.likes,
            skips: counts.skips,
        }
    }
}

/// Central event distribution bus for one venue room
///
/// Backed by tokio::broadcast: non-blocking publish, multiple concurrent
/// subscribers, automatic cleanup when receivers drop, lag detection for
/// slow subscribers. A reconnecting subscriber may have missed an arbitrary
/// prefix of events and must reconcile via a full-state fetch.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<VenueEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events. Events emitted before subscription
    /// are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<VenueEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns `Ok(subscriber_count)`; errs when nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: VenueEvent,
    ) -> Result<usize, broadcast::error::SendError<VenueEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening. Used for
    /// progress ticks and other events where missed delivery is acceptable.
    pub fn emit_lossy(&self, event: VenueEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
