//! Session Coordinator (rockola-sc)
//!
//! Hosts the queue/playback coordination engine for one venue: the
//! authoritative pending queue, the current-item pointer, end-of-track
//! detection and advancement, reconciliation with a fallible remote
//! playback engine, and real-time fan-out of every state transition to all
//! connected observers.

pub mod api;
pub mod device;
pub mod fanout;
pub mod playback;
pub mod session;
pub mod state;
pub mod store;
pub mod votes;

pub use playback::coordinator::{Coordinator, CoordinatorConfig};
pub use state::SharedState;
