//! End-of-track detection
//!
//! The remote engine does not deliver a reliable "track ended" signal; the
//! observable end is a transition to `not playing` with the reported
//! position snapped back to zero. That same shape also appears transiently
//! while a track is still loading, so a bare transition check would advance
//! the queue before playback ever started.
//!
//! A track is considered ended only when all of the following hold on one
//! observation:
//! - the device reports not playing,
//! - the reported position is exactly 0,
//! - the previous observation was playing,
//! - detection is armed (at least one playing observation with a non-zero
//!   position has been seen for the current item),
//! - the highest observed position exceeded the minimum progress threshold.
//!
//! Observations made while the session is restoring, or while no current
//! item is set, are discarded entirely. The detector fires at most once per
//! item; `reset` rearms it when a new item starts.

/// Stateful end-of-track detector for a single current item
#[derive(Debug)]
pub struct TrackEndDetector {
    /// Minimum position the track must have reached before an
    /// end-of-track transition is believed (default 1000 ms)
    min_progress_ms: u64,

    /// Set once a playing observation with position > 0 is seen
    armed: bool,

    /// Transport state of the previous observation
    last_was_playing: bool,

    /// Highest position observed for the current item
    max_position_ms: u64,
}

impl TrackEndDetector {
    pub fn new(min_progress_ms: u64) -> Self {
        Self {
            min_progress_ms,
            armed: false,
            last_was_playing: false,
            max_position_ms: 0,
        }
    }

    /// Forget everything about the current item. Called when a new item
    /// starts playing and when a session reattach begins.
    pub fn reset(&mut self) {
        self.armed = false;
        self.last_was_playing = false;
        self.max_position_ms = 0;
    }

    /// Feed one transport observation. Returns true exactly once per item
    /// when the end-of-track conditions are all met.
    pub fn observe(
        &mut self,
        is_playing: bool,
        position_ms: u64,
        has_current: bool,
        restoring: bool,
    ) -> bool {
        if restoring || !has_current {
            // Reattachment transients and idle-state noise must not leave
            // bookkeeping behind that a later observation could trip over.
            return false;
        }

        let ended = !is_playing
            && position_ms == 0
            && self.last_was_playing
            && self.armed
            && self.max_position_ms > self.min_progress_ms;

        if is_playing && position_ms > 0 {
            self.armed = true;
        }
        if position_ms > self.max_position_ms {
            self.max_position_ms = position_ms;
        }
        self.last_was_playing = is_playing;

        if ended {
            self.reset();
        }
        ended
    }
}
