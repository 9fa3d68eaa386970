//! Realtime fan-out rooms
//!
//! One broadcast room per venue relays every queue/playback/vote event to
//! all connected observers. Delivery to an individual subscriber is
//! at-least-once across reconnects and carries no cross-event ordering
//! guarantee; reconnecting observers re-fetch full state instead of relying
//! on replay, so handlers must be idempotent.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use rockola_common::events::{EventBus, VenueEvent};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// Registry of venue rooms
#[derive(Clone)]
pub struct VenueRooms {
    inner: Arc<RwLock<HashMap<String, Room>>>,
    capacity: usize,
}

impl VenueRooms {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Join a venue's room, creating it on first use
    pub async fn join(&self, venue_id: &str) -> Room {
        let mut rooms = self.inner.write().await;
        rooms
            .entry(venue_id.to_string())
            .or_insert_with(|| {
                info!("Creating fan-out room for venue {}", venue_id);
                Room {
                    venue_id: venue_id.to_string(),
                    bus: EventBus::new(self.capacity),
                }
            })
            .clone()
    }
}

/// One venue's broadcast room
#[derive(Clone)]
pub struct Room {
    venue_id: String,
    bus: EventBus,
}

impl Room {
    pub fn venue_id(&self) -> &str {
        &self.venue_id
    }

    /// Publish an event to every subscriber. Lossy: a venue with no
    /// connected observers is normal.
    pub fn publish(&self, event: VenueEvent) {
        debug!(
            venue = %self.venue_id,
            event = event.event_type(),
            subscribers = self.bus.subscriber_count(),
            "fan-out publish"
        );
        self.bus.emit_lossy(event);
    }

    /// Subscribe to the room. Dropping the receiver is the unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<VenueEvent> {
        self.bus.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    /// SSE stream of the room's events for an HTTP observer
    pub fn sse_stream(&self) -> impl Stream<Item = Result<Event, Infallible>> {
        let rx = self.subscribe();
        let stream = tokio_stream::wrappers::BroadcastStream::new(rx);

        stream.filter_map(|result| async move {
            match result {
                Ok(venue_event) => Event::default()
                    .event(venue_event.event_type())
                    .json_data(&venue_event)
                    .ok()
                    .map(Ok),
                Err(e) => {
                    // Lagged subscriber; it will reconcile via full refetch
                    warn!("SSE subscriber error: {:?}", e);
                    None
                }
            }
        })
    }

    /// Axum SSE response for GET /events
    pub fn handle_sse_connection(&self) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        info!(
            "New SSE observer for venue {}, total observers: {}",
            self.venue_id,
            self.subscriber_count() + 1
        );
        Sse::new(self.sse_stream()).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(30))
                .text("keep-alive"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_returns_same_room_per_venue() {
        let rooms = VenueRooms::new(16);
        let room_a = rooms.join("venue-a").await;
        let mut rx = room_a.subscribe();

        // A second join must reach the same bus
        let room_again = rooms.join("venue-a").await;
        room_again.publish(VenueEvent::QueueUpdate);

        assert_eq!(rx.recv().await.unwrap().event_type(), "queue_update");
    }

    #[tokio::test]
    async fn test_rooms_are_venue_scoped() {
        let rooms = VenueRooms::new(16);
        let room_a = rooms.join("venue-a").await;
        let room_b = rooms.join("venue-b").await;

        let mut rx_b = room_b.subscribe();
        room_a.publish(VenueEvent::HistoryUpdate);

        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_drop_is_unsubscribe() {
        let rooms = VenueRooms::new(16);
        let room = rooms.join("venue-a").await;
        let rx = room.subscribe();
        assert_eq!(room.subscriber_count(), 1);
        drop(rx);
        assert_eq!(room.subscriber_count(), 0);
    }
}
