//! Shared session state
//!
//! Thread-safe state shared between the coordinator, the aggregator, the
//! device adapter tasks and the API handlers. Uses RwLock for concurrent
//! read access with rare writes.

use rockola_common::model::PlaybackSnapshot;
use tokio::sync::RwLock;

/// State shared by all components of one venue session
pub struct SharedState {
    /// Latest locally-observed playback snapshot
    snapshot: RwLock<PlaybackSnapshot>,

    /// Restoration interlock. While true, end-of-track detection and
    /// empty-queue reactions are suppressed so a reattaching client does
    /// not re-advance a queue that is already playing venue-wide.
    restoring: RwLock<bool>,

    /// Whether the playback device finished initialization
    device_ready: RwLock<bool>,

    /// Gate for all background loops; cleared on detach/stop
    running: RwLock<bool>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(PlaybackSnapshot::idle()),
            restoring: RwLock::new(false),
            device_ready: RwLock::new(false),
            running: RwLock::new(false),
        }
    }

    pub async fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn set_snapshot(&self, snapshot: PlaybackSnapshot) {
        *self.snapshot.write().await = snapshot;
    }

    /// Apply a closure to the snapshot under the write lock and return the
    /// updated copy
    pub async fn update_snapshot<F>(&self, f: F) -> PlaybackSnapshot
    where
        F: FnOnce(&mut PlaybackSnapshot),
    {
        let mut guard = self.snapshot.write().await;
        f(&mut guard);
        guard.clamp_position();
        guard.clone()
    }

    pub async fn is_restoring(&self) -> bool {
        *self.restoring.read().await
    }

    pub async fn set_restoring(&self, value: bool) {
        *self.restoring.write().await = value;
    }

    pub async fn is_device_ready(&self) -> bool {
        *self.device_ready.read().await
    }

    pub async fn set_device_ready(&self, value: bool) {
        *self.device_ready.write().await = value;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub async fn set_running(&self, value: bool) {
        *self.running.write().await = value;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
