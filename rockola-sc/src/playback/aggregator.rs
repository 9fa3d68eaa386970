//! Playback state aggregation
//!
//! Single source of truth for "what is playing now" as observed locally.
//! Two inputs feed it: device state-changed notifications (authoritative
//! for transport) and the synthesized 1-second tick (position interpolation
//! only). Every update is republished venue-wide as a full snapshot;
//! consumers treat each publication as a complete replace.

use rockola_common::events::VenueEvent;
use rockola_common::model::PlaybackSnapshot;
use std::sync::Arc;
use tracing::debug;

use crate::device::DeviceNotification;
use crate::fanout::Room;
use crate::state::SharedState;

pub struct Aggregator {
    venue_id: String,
    state: Arc<SharedState>,
    room: Room,
}

impl Aggregator {
    pub fn new(venue_id: impl Into<String>, state: Arc<SharedState>, room: Room) -> Self {
        Self {
            venue_id: venue_id.into(),
            state,
            room,
        }
    }

    /// Fold one device notification into the snapshot and republish.
    ///
    /// Returns the transport observation (is_playing, position) for
    /// end-of-track detection.
    pub async fn apply_device(&self, notification: DeviceNotification) -> (bool, u64) {
        match notification {
            DeviceNotification::StateChanged {
                track_id,
                is_playing,
                position_ms,
                duration_ms,
            } => {
                let before = self.state.snapshot().await;
                let after = self
                    .state
                    .update_snapshot(|s| {
                        s.is_playing = is_playing;
                        s.position_ms = position_ms;
                        if duration_ms > 0 {
                            s.duration_ms = duration_ms;
                        }
                    })
                    .await;

                if let Some(reported) = &track_id {
                    let expected = after.current_track.as_ref().map(|t| t.catalog_id.as_str());
                    if expected.is_some() && expected != Some(reported.as_str()) {
                        debug!(
                            "Engine reports track {} while current item is {:?}",
                            reported, expected
                        );
                    }
                }

                self.publish_full(&after);
                if before.is_playing != after.is_playing {
                    self.room.publish(VenueEvent::PlaybackStateChange {
                        is_playing: after.is_playing,
                        position: after.position_ms,
                    });
                }
                (is_playing, position_ms)
            }
            DeviceNotification::Tick {
                position_ms,
                duration_ms,
            } => {
                let after = self
                    .state
                    .update_snapshot(|s| {
                        // Position only advances while playing
                        if s.is_playing {
                            s.position_ms = position_ms;
                            if duration_ms > 0 {
                                s.duration_ms = duration_ms;
                            }
                        }
                    })
                    .await;
                self.room.publish(VenueEvent::PlaybackProgress {
                    position: after.position_ms,
                    duration: after.duration_ms,
                });
                (after.is_playing, after.position_ms)
            }
        }
    }

    /// Replace the snapshot wholesale with remotely-confirmed state (the
    /// venue's displayed state was changed by another session) and
    /// republish.
    pub async fn apply_remote(&self, snapshot: PlaybackSnapshot) {
        self.state.set_snapshot(snapshot.clone()).await;
        self.publish_full(&snapshot);
    }

    /// Publish the current snapshot as a full replace
    pub async fn republish(&self) {
        let snapshot = self.state.snapshot().await;
        self.publish_full(&snapshot);
    }

    fn publish_full(&self, snapshot: &PlaybackSnapshot) {
        self.room.publish(VenueEvent::PlaybackUpdate {
            establecimiento_id: self.venue_id.clone(),
            current_track: snapshot.current_track.clone(),
            is_playing: snapshot.is_playing,
            position: snapshot.position_ms,
            duration: snapshot.duration_ms,
        });
    }
}
