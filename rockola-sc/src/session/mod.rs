//! Session attach, restoration and teardown
//!
//! A client (re)attaching to a venue must not disturb playback that is
//! already running venue-wide. On attach the coordinator asks the store for
//! the venue's current item; if one exists, the session enters restoring
//! mode, reattaches the device to that item WITHOUT calling play_next (no
//! re-marking, no re-ordering), and only leaves restoring mode after a
//! settle delay. The restoring flag is the sole interlock between
//! restoration and the concurrently running end-of-track check: it goes up
//! before any device command and comes down only after the device has had
//! time to emit its possibly-stale initial transients.

use rockola_common::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::playback::coordinator::Coordinator;
use crate::store;

impl Coordinator {
    /// Attach this session to the venue and start the background loops.
    ///
    /// With a venue-wide current item: restore. Without one: normal idle
    /// start, no forced restoration.
    pub async fn attach(self: &Arc<Self>) -> Result<()> {
        self.shared_state().set_running(true).await;
        self.start_background_tasks();

        match store::get_current(self.db(), self.venue_id()).await? {
            Some(current) => {
                info!(
                    "Venue {} already playing {} ({}), restoring session",
                    self.venue_id(),
                    current.id,
                    current.track.title
                );

                // Interlock up before any device command goes out
                self.shared_state().set_restoring(true).await;
                self.reset_detector().await;

                let resume_position = self.shared_state().snapshot().await.position_ms;
                self.shared_state()
                    .update_snapshot(|s| {
                        s.current_item_id = Some(current.id);
                        s.current_track = Some(current.track.clone());
                        s.is_playing = true;
                        s.duration_ms = current.track.duration_ms;
                    })
                    .await;

                if let Err(e) = self.device().play_track(&current.track, resume_position).await {
                    // Reattach failure leaves the authoritative state alone;
                    // the device converges on its own schedule
                    tracing::warn!("Device reattach failed: {}", e);
                }
                self.aggregator().republish().await;

                // The settle window absorbs the device's initial transients
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(this.config.settle_delay).await;
                    this.shared_state().set_restoring(false).await;
                    debug!(
                        "Restoration settle window elapsed for venue {}",
                        this.venue_id()
                    );
                });
            }
            None => {
                debug!(
                    "No venue-wide playback in progress for {}, starting idle",
                    self.venue_id()
                );
            }
        }

        Ok(())
    }

    /// Tear the session down: stops every background loop and the device
    /// adapter's tasks. Timers must not keep firing against a detached
    /// coordinator.
    pub async fn detach(&self) {
        info!("Detaching session from venue {}", self.venue_id());
        self.shared_state().set_running(false).await;
        self.device().shutdown().await;
    }
}
