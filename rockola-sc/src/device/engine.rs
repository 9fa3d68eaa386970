//! Remote playback engine contract
//!
//! The third-party playback engine is opaque: the rest of the system only
//! sees this trait. State changes arrive asynchronously over a broadcast
//! channel; the engine is NOT expected to emit anything during steady
//! playback, only on transitions (play, pause, track change, end).

use async_trait::async_trait;
use rockola_common::model::Track;
use thiserror::Error;
use tokio::sync::broadcast;

use super::credentials::DeviceCredentials;

/// Engine command failures, classified so the adapter can react
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// The engine has no active output target; the adapter activates the
    /// device and retries the command once.
    #[error("no active output target")]
    NoActiveOutput,

    /// The account's subscription tier does not permit remote control.
    /// Unrecoverable by retry; must surface an actionable message.
    #[error("subscription tier does not permit remote playback")]
    RestrictedTier,

    /// Credentials rejected by the engine
    #[error("authorization failed: {0}")]
    Auth(String),

    /// Anything else (network, engine-internal)
    #[error("engine transport error: {0}")]
    Transport(String),
}

/// Engine-reported playback state
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    /// Catalog id of the track the engine believes it is playing
    pub track_id: Option<String>,
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
}

impl EngineState {
    pub fn stopped() -> Self {
        Self {
            track_id: None,
            is_playing: false,
            position_ms: 0,
            duration_ms: 0,
        }
    }
}

/// Asynchronous capability object over the external playback engine
#[async_trait]
pub trait RemoteEngine: Send + Sync {
    /// Establish the engine connection with the given credentials
    async fn connect(&self, credentials: DeviceCredentials) -> Result<(), EngineError>;

    /// Whether the engine is connected and ready to accept commands
    async fn is_ready(&self) -> bool;

    /// Begin playback of a track at the given position
    async fn play(&self, track: &Track, position_ms: u64) -> Result<(), EngineError>;

    /// Claim this client as the engine's active output target
    async fn activate(&self) -> Result<(), EngineError>;

    async fn pause(&self) -> Result<(), EngineError>;

    async fn resume(&self) -> Result<(), EngineError>;

    async fn seek(&self, position_ms: u64) -> Result<(), EngineError>;

    /// Volume normalized 0.0 to 1.0
    async fn set_volume(&self, volume: f32) -> Result<(), EngineError>;

    /// Subscribe to engine state transitions
    fn state_events(&self) -> broadcast::Receiver<EngineState>;

    /// Last state the engine reported
    async fn current_state(&self) -> EngineState;
}
