//! Queue coordinator
//!
//! Owns the authoritative ordering of pending queue items for one venue and
//! the single current-item pointer. Detects end-of-track, advances the
//! queue, persists every mutation, and publishes each transition to the
//! venue room exactly once.
//!
//! The lifecycle is Idle (no current item) to Playing (current item set) to
//! Ending (end-of-track detected) and back to Idle or Playing. A forced
//! transition to Playing happens on play-now insertion and on an external
//! skip signal; both bypass natural end-of-track.
//!
//! Failure semantics: once the authoritative "now playing" write commits,
//! device command failures never roll the transition back; queue and device
//! are allowed to diverge transiently. Store mutation failures propagate to
//! the caller and force a full reload, because local state is never trusted
//! after an error.

use rockola_common::events::VenueEvent;
use rockola_common::model::{ItemStatus, PlaybackSnapshot, QueueItem, Track, VoteCounts};
use rockola_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::device::DeviceAdapter;
use crate::fanout::Room;
use crate::playback::aggregator::Aggregator;
use crate::playback::detector::TrackEndDetector;
use crate::state::SharedState;
use crate::store;
use crate::votes::VoteTally;

/// Coordinator tunables. The progress guard and settle delay are empirical
/// thresholds, kept configurable rather than hard-coded.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Minimum observed position before an end-of-track transition is
    /// believed
    pub min_progress_ms: u64,
    /// Cadence of the periodic end-of-track check
    pub check_interval: Duration,
    /// How long the restoring interlock stays up after a reattach, to
    /// absorb the device's initial stale transients
    pub settle_delay: Duration,
    /// Distinct skip votes required to trigger a venue-wide skip
    pub skip_threshold: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_progress_ms: 1000,
            check_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(2),
            skip_threshold: 3,
        }
    }
}

pub struct Coordinator {
    venue_id: String,
    db: SqlitePool,
    device: Arc<DeviceAdapter>,
    state: Arc<SharedState>,
    room: Room,
    aggregator: Aggregator,
    detector: Mutex<TrackEndDetector>,
    votes: Mutex<VoteTally>,
    pub(crate) config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        venue_id: impl Into<String>,
        db: SqlitePool,
        device: Arc<DeviceAdapter>,
        state: Arc<SharedState>,
        room: Room,
        config: CoordinatorConfig,
    ) -> Self {
        let venue_id = venue_id.into();
        let aggregator = Aggregator::new(venue_id.clone(), Arc::clone(&state), room.clone());
        Self {
            venue_id,
            db,
            device,
            state: Arc::clone(&state),
            room,
            aggregator,
            detector: Mutex::new(TrackEndDetector::new(config.min_progress_ms)),
            votes: Mutex::new(VoteTally::new(config.skip_threshold)),
            config,
        }
    }

    pub fn venue_id(&self) -> &str {
        &self.venue_id
    }

    pub(crate) fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub(crate) fn shared_state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub(crate) fn device(&self) -> &Arc<DeviceAdapter> {
        &self.device
    }

    pub(crate) fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub(crate) async fn reset_detector(&self) {
        self.detector.lock().await.reset();
    }

    /// Spawn the background loops: device notification consumer, periodic
    /// end-of-track check, and the venue-room skip listener. All exit when
    /// the session running flag clears.
    pub(crate) fn start_background_tasks(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.notification_loop().await });

        let this = Arc::clone(self);
        tokio::spawn(async move { this.check_loop().await });

        let this = Arc::clone(self);
        tokio::spawn(async move { this.skip_listener_loop().await });
    }

    // ===== Queue mutations =====

    /// Append a track to the pending queue. Returns the created item with
    /// its assigned position.
    pub async fn enqueue(&self, track: Track, contributor: &str) -> Result<QueueItem> {
        let item = self
            .mutation(store::enqueue(&self.db, &self.venue_id, &track, contributor).await)
            .await?;
        info!(
            "Enqueued {} at position {:?} for venue {}",
            item.id, item.position, self.venue_id
        );
        self.room.publish(VenueEvent::QueueUpdate);
        Ok(item)
    }

    /// Insert a track at the head of the queue and force it to play right
    /// now, bypassing normal queue order.
    pub async fn enqueue_and_play_now(&self, track: Track, contributor: &str) -> Result<QueueItem> {
        let item = self
            .mutation(store::enqueue_front(&self.db, &self.venue_id, &track, contributor).await)
            .await?;
        info!(
            "Play-now insertion {} for venue {}",
            item.id, self.venue_id
        );
        self.room.publish(VenueEvent::QueueUpdate);
        self.play_next().await?;
        Ok(item)
    }

    /// Remove an item outright. Removing the currently playing item is
    /// permitted: it stops being tracked, with no reflex advancement.
    pub async fn remove(&self, item_id: Uuid) -> Result<()> {
        let removed = self
            .mutation(store::remove(&self.db, &self.venue_id, item_id).await)
            .await?;
        info!("Removed {} from venue {}", item_id, self.venue_id);

        if removed.status == ItemStatus::Playing {
            self.reset_detector().await;
            self.clear_current_snapshot().await;
        }
        self.room.publish(VenueEvent::QueueUpdate);
        Ok(())
    }

    /// Move a pending item to a new position. Returns the full re-derived
    /// ordering from the store; optimistic client-side order is never
    /// trusted under concurrent reorders.
    pub async fn reorder(&self, item_id: Uuid, target_position: i64) -> Result<Vec<QueueItem>> {
        let ordering = self
            .mutation(store::reorder(&self.db, &self.venue_id, item_id, target_position).await)
            .await?;
        self.room.publish(VenueEvent::QueueUpdate);
        Ok(ordering)
    }

    // ===== Advancement =====

    /// Idle to Playing: pop the lowest-position pending item, mark it
    /// playing (demoting any prior playing item), command the device, and
    /// announce the transition. Returns None when the queue is empty.
    pub async fn play_next(&self) -> Result<Option<QueueItem>> {
        let pending = store::get_pending(&self.db, &self.venue_id).await?;
        let Some(first) = pending.into_iter().next() else {
            debug!("Queue empty for venue {}, staying idle", self.venue_id);
            return Ok(None);
        };

        let item = self
            .mutation(store::set_current_playing(&self.db, &self.venue_id, first.id).await)
            .await?;
        info!(
            "Now playing {} ({}) at venue {}",
            item.id, item.track.title, self.venue_id
        );

        self.begin_item(&item).await;
        Ok(Some(item))
    }

    /// Forced advance: resolve the current item as skipped and start the
    /// next pending item immediately.
    pub async fn skip_to_next(&self) -> Result<Option<QueueItem>> {
        info!("Skipping current item at venue {}", self.venue_id);
        if let Some(resolved) = self
            .mutation(store::resolve_current(&self.db, &self.venue_id, ItemStatus::Skipped).await)
            .await?
        {
            debug!("Resolved {} as skipped", resolved.id);
            self.room.publish(VenueEvent::HistoryUpdate);
        }
        self.reset_detector().await;
        self.clear_current_snapshot().await;
        self.play_next().await
    }

    /// Ending to Idle/Playing: move the finished item to history, clear the
    /// pointer, then immediately attempt the next item.
    async fn handle_track_end(&self) -> Result<()> {
        if let Some(resolved) = self
            .mutation(store::resolve_current(&self.db, &self.venue_id, ItemStatus::Played).await)
            .await?
        {
            debug!("Moved {} to history", resolved.id);
            self.room.publish(VenueEvent::HistoryUpdate);
        }
        self.clear_current_snapshot().await;

        if self.play_next().await?.is_none() {
            info!("Venue {} idle: no pending items after track end", self.venue_id);
        }
        Ok(())
    }

    /// Transition bookkeeping shared by play_next and restoration
    async fn begin_item(&self, item: &QueueItem) {
        self.reset_detector().await;
        {
            let mut votes = self.votes.lock().await;
            votes.reset();
            self.room.publish(VenueEvent::votes(votes.counts()));
        }

        self.state
            .update_snapshot(|s| {
                s.current_item_id = Some(item.id);
                s.current_track = Some(item.track.clone());
                s.is_playing = true;
                s.position_ms = 0;
                s.duration_ms = item.track.duration_ms;
            })
            .await;

        // The authoritative write already committed; a device failure here
        // leaves queue and device transiently divergent, and the adapter
        // keeps retrying on its own.
        if let Err(e) = self.device.play_track(&item.track, 0).await {
            warn!("Device play command failed, queue transition stands: {}", e);
        }

        self.room.publish(VenueEvent::TrackStarted {
            track: item.track.clone(),
        });
        self.room.publish(VenueEvent::QueueUpdate);
        self.aggregator.republish().await;
    }

    pub(crate) async fn clear_current_snapshot(&self) {
        self.state
            .update_snapshot(|s| {
                s.current_item_id = None;
                s.current_track = None;
                s.is_playing = false;
                s.position_ms = 0;
                s.duration_ms = 0;
            })
            .await;
        self.aggregator.republish().await;
    }

    // ===== Transport controls =====

    pub async fn pause(&self) {
        self.device.pause().await;
        let after = self.state.update_snapshot(|s| s.is_playing = false).await;
        self.room.publish(VenueEvent::PlaybackStateChange {
            is_playing: false,
            position: after.position_ms,
        });
    }

    pub async fn resume(&self) {
        self.device.resume().await;
        let after = self.state.update_snapshot(|s| s.is_playing = true).await;
        self.room.publish(VenueEvent::PlaybackStateChange {
            is_playing: true,
            position: after.position_ms,
        });
    }

    pub async fn seek(&self, position_ms: u64) {
        self.device.seek(position_ms).await;
        let after = self
            .state
            .update_snapshot(|s| s.position_ms = position_ms)
            .await;
        self.room.publish(VenueEvent::PlaybackProgress {
            position: after.position_ms,
            duration: after.duration_ms,
        });
    }

    pub async fn set_volume(&self, volume: f32) {
        self.device.set_volume(volume).await;
        self.state
            .update_snapshot(|s| s.volume = volume.clamp(0.0, 1.0))
            .await;
        self.aggregator.republish().await;
    }

    // ===== Votes =====

    pub async fn vote_like(&self, contributor: &str) -> VoteCounts {
        let counts = self.votes.lock().await.like(contributor);
        self.room.publish(VenueEvent::votes(counts));
        counts
    }

    /// Register a skip vote. On the vote that crosses the threshold the
    /// venue-wide skip signal is published; the driving session's listener
    /// reacts by advancing the queue.
    pub async fn vote_skip(&self, contributor: &str) -> VoteCounts {
        let (counts, reached) = self.votes.lock().await.vote_skip(contributor);
        self.room.publish(VenueEvent::votes(counts));
        if reached {
            info!("Skip vote threshold reached at venue {}", self.venue_id);
            self.room.publish(VenueEvent::TrackSkipped {
                establecimiento_id: self.venue_id.clone(),
            });
        }
        counts
    }

    // ===== Queries =====

    pub async fn queue(&self) -> Result<Vec<QueueItem>> {
        store::get_pending(&self.db, &self.venue_id).await
    }

    pub async fn history(&self, limit: i64) -> Result<Vec<QueueItem>> {
        store::get_history(&self.db, &self.venue_id, limit).await
    }

    pub async fn snapshot(&self) -> PlaybackSnapshot {
        self.state.snapshot().await
    }

    // ===== Error recovery =====

    /// Re-derive local state from the store and republish. Called after any
    /// mutation failure and available to API callers recovering from a
    /// fan-out reconnect. The store-confirmed state replaces the local
    /// snapshot; nothing is merged.
    pub async fn reload(&self) {
        match store::get_current(&self.db, &self.venue_id).await {
            Ok(current) => {
                let local = self.state.snapshot().await;
                let authoritative = current.as_ref().map(|i| i.id);
                if local.current_item_id != authoritative {
                    warn!(
                        "Local current item {:?} diverged from store {:?}, converging",
                        local.current_item_id, authoritative
                    );
                    let mut replacement = PlaybackSnapshot::idle();
                    replacement.volume = local.volume;
                    if let Some(item) = &current {
                        replacement.current_item_id = Some(item.id);
                        replacement.current_track = Some(item.track.clone());
                        replacement.is_playing = local.is_playing;
                        replacement.duration_ms = item.track.duration_ms;
                    }
                    self.aggregator.apply_remote(replacement).await;
                }
            }
            Err(e) => warn!("State reload failed: {}", e),
        }
        self.room.publish(VenueEvent::QueueUpdate);
    }

    /// On mutation failure, force a reload before propagating the error
    async fn mutation<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.reload().await;
        }
        result
    }

    // ===== Background loops =====

    async fn observe_transport(&self, is_playing: bool, position_ms: u64) {
        let has_current = self.state.snapshot().await.current_item_id.is_some();
        let restoring = self.state.is_restoring().await;
        let ended = self
            .detector
            .lock()
            .await
            .observe(is_playing, position_ms, has_current, restoring);
        if ended {
            info!("End of track detected at venue {}", self.venue_id);
            if let Err(e) = self.handle_track_end().await {
                error!("Queue advancement after track end failed: {}", e);
            }
        }
    }

    async fn notification_loop(self: Arc<Self>) {
        let mut rx = self.device.subscribe();
        let mut check = interval(Duration::from_millis(500));
        debug!("Device notification loop started for venue {}", self.venue_id);
        loop {
            tokio::select! {
                _ = check.tick() => {
                    if !self.state.is_running().await {
                        break;
                    }
                }
                result = rx.recv() => match result {
                    Ok(notification) => {
                        let (is_playing, position_ms) =
                            self.aggregator.apply_device(notification).await;
                        self.observe_transport(is_playing, position_ms).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Dropped {} device notifications", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        debug!("Device notification loop stopped for venue {}", self.venue_id);
    }

    /// Periodic end-of-track check. Catches track ends whose device signal
    /// was missed; the detector makes double observation of the same end
    /// harmless.
    async fn check_loop(self: Arc<Self>) {
        let mut ticker = interval(self.config.check_interval);
        loop {
            ticker.tick().await;
            if !self.state.is_running().await {
                break;
            }
            let (is_playing, position_ms, _) = self.device.current_transport().await;
            self.observe_transport(is_playing, position_ms).await;
        }
        debug!("End-of-track check loop stopped for venue {}", self.venue_id);
    }

    async fn skip_listener_loop(self: Arc<Self>) {
        let mut rx = self.room.subscribe();
        let mut check = interval(Duration::from_millis(500));
        loop {
            tokio::select! {
                _ = check.tick() => {
                    if !self.state.is_running().await {
                        break;
                    }
                }
                result = rx.recv() => match result {
                    Ok(VenueEvent::TrackSkipped { .. }) => {
                        if let Err(e) = self.skip_to_next().await {
                            error!("Skip after venue-wide signal failed: {}", e);
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        debug!("Skip listener stopped for venue {}", self.venue_id);
    }
}
