//! Device adapter
//!
//! Thin ownership layer over the remote playback engine. Owns device-level
//! concerns the rest of the system must never see: credentials fetch and
//! token refresh, bounded readiness wait, the activate-and-retry dance when
//! the engine has no active output target, and the synthesized 1-second
//! progress tick that the engine itself does not provide during steady
//! playback.
//!
//! Transport commands (pause, resume, seek, volume) are best-effort:
//! failures are logged and absorbed here. Playback commands must never
//! block queue advancement.

use rockola_common::model::Track;
use rockola_common::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, sleep, timeout};
use tracing::{debug, info, warn};

use super::credentials::CredentialsProvider;
use super::engine::{EngineError, EngineState, RemoteEngine};

/// Device-level tunables
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Bounded wait for engine readiness during initialization
    pub ready_timeout: Duration,
    /// Poll interval inside the readiness wait
    pub ready_poll: Duration,
    /// Synthesized progress tick cadence while playing
    pub tick_interval: Duration,
    /// How far ahead of token expiry the refresh runs
    pub refresh_margin: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(10),
            ready_poll: Duration::from_millis(100),
            tick_interval: Duration::from_secs(1),
            refresh_margin: Duration::from_secs(60),
        }
    }
}

/// Normalized device notifications consumed by the aggregator
#[derive(Debug, Clone)]
pub enum DeviceNotification {
    /// Engine reported a transition (play, pause, track change, end)
    StateChanged {
        track_id: Option<String>,
        is_playing: bool,
        position_ms: u64,
        duration_ms: u64,
    },
    /// Synthesized position tick, emitted only while playing
    Tick { position_ms: u64, duration_ms: u64 },
}

/// Last engine-reported transport state plus when it was recorded, for
/// tick-time position extrapolation
struct TransportTrack {
    state: EngineState,
    recorded_at: Instant,
}

pub struct DeviceAdapter {
    engine: Arc<dyn RemoteEngine>,
    credentials: Arc<dyn CredentialsProvider>,
    config: DeviceConfig,
    notify_tx: broadcast::Sender<DeviceNotification>,
    transport: RwLock<TransportTrack>,
    running: RwLock<bool>,
}

impl DeviceAdapter {
    pub fn new(
        engine: Arc<dyn RemoteEngine>,
        credentials: Arc<dyn CredentialsProvider>,
        config: DeviceConfig,
    ) -> Self {
        let (notify_tx, _) = broadcast::channel(64);
        Self {
            engine,
            credentials,
            config,
            notify_tx,
            transport: RwLock::new(TransportTrack {
                state: EngineState::stopped(),
                recorded_at: Instant::now(),
            }),
            running: RwLock::new(false),
        }
    }

    /// Connect and prepare the device for the venue.
    ///
    /// Fails with `DeviceInit` when credentials are absent or the engine
    /// rejects the connection, and with `DeviceTimeout` when the engine
    /// never becomes ready within the bounded wait. On success the
    /// notification forwarder, progress ticker and token-refresh tasks are
    /// running.
    pub async fn initialize(self: &Arc<Self>, venue_id: &str) -> Result<()> {
        info!("Initializing playback device for venue {}", venue_id);

        let creds = self.credentials.get(venue_id).await.map_err(|e| match e {
            Error::DeviceInit(m) => Error::DeviceInit(m),
            other => Error::DeviceInit(format!("credentials unavailable: {}", other)),
        })?;
        let expires_at = creds.expires_at;

        self.engine
            .connect(creds)
            .await
            .map_err(map_connect_error)?;

        let ready_wait = async {
            while !self.engine.is_ready().await {
                sleep(self.config.ready_poll).await;
            }
        };
        timeout(self.config.ready_timeout, ready_wait)
            .await
            .map_err(|_| {
                Error::DeviceTimeout(format!(
                    "device not ready within {:?}",
                    self.config.ready_timeout
                ))
            })?;

        *self.running.write().await = true;

        let this = Arc::clone(self);
        tokio::spawn(async move { this.forward_loop().await });

        let this = Arc::clone(self);
        tokio::spawn(async move { this.tick_loop().await });

        let this = Arc::clone(self);
        let venue = venue_id.to_string();
        tokio::spawn(async move { this.refresh_loop(venue, expires_at).await });

        info!("Playback device ready");
        Ok(())
    }

    /// Issue a play command.
    ///
    /// When the engine reports no active output target, the adapter issues
    /// a device-activation command and retries the play exactly once before
    /// surfacing the failure.
    pub async fn play_track(&self, track: &Track, position_ms: u64) -> Result<()> {
        match self.engine.play(track, position_ms).await {
            Ok(()) => Ok(()),
            Err(EngineError::NoActiveOutput) => {
                warn!("No active output target, activating device and retrying");
                self.engine.activate().await.map_err(map_command_error)?;
                self.engine
                    .play(track, position_ms)
                    .await
                    .map_err(map_command_error)
            }
            Err(e) => Err(map_command_error(e)),
        }
    }

    pub async fn pause(&self) {
        if let Err(e) = self.engine.pause().await {
            warn!("Pause command failed: {}", e);
        }
    }

    pub async fn resume(&self) {
        if let Err(e) = self.engine.resume().await {
            warn!("Resume command failed: {}", e);
        }
    }

    pub async fn seek(&self, position_ms: u64) {
        if let Err(e) = self.engine.seek(position_ms).await {
            warn!("Seek command failed: {}", e);
        }
    }

    pub async fn set_volume(&self, volume: f32) {
        if let Err(e) = self.engine.set_volume(volume.clamp(0.0, 1.0)).await {
            warn!("Volume command failed: {}", e);
        }
    }

    /// Subscribe to normalized device notifications
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceNotification> {
        self.notify_tx.subscribe()
    }

    /// Current transport observation, position extrapolated from the last
    /// engine report while playing. Used by the periodic end-of-track poll.
    pub async fn current_transport(&self) -> (bool, u64, u64) {
        let guard = self.transport.read().await;
        let state = &guard.state;
        if !state.is_playing {
            return (false, state.position_ms, state.duration_ms);
        }
        let mut position = state.position_ms + guard.recorded_at.elapsed().as_millis() as u64;
        if state.duration_ms > 0 && position > state.duration_ms {
            position = state.duration_ms;
        }
        (true, position, state.duration_ms)
    }

    /// Stop background tasks. Safe to call more than once.
    pub async fn shutdown(&self) {
        *self.running.write().await = false;
    }

    async fn forward_loop(self: Arc<Self>) {
        let mut rx = self.engine.state_events();
        let mut check = interval(Duration::from_millis(500));
        debug!("Device notification forwarder started");
        loop {
            tokio::select! {
                _ = check.tick() => {
                    if !*self.running.read().await {
                        break;
                    }
                }
                result = rx.recv() => match result {
                    Ok(state) => {
                        {
                            let mut guard = self.transport.write().await;
                            guard.state = state.clone();
                            guard.recorded_at = Instant::now();
                        }
                        let _ = self.notify_tx.send(DeviceNotification::StateChanged {
                            track_id: state.track_id,
                            is_playing: state.is_playing,
                            position_ms: state.position_ms,
                            duration_ms: state.duration_ms,
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Dropped {} engine state events", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        debug!("Device notification forwarder stopped");
    }

    async fn tick_loop(self: Arc<Self>) {
        let mut ticker = interval(self.config.tick_interval);
        loop {
            ticker.tick().await;
            if !*self.running.read().await {
                break;
            }
            let (is_playing, position_ms, duration_ms) = self.current_transport().await;
            if is_playing {
                let _ = self.notify_tx.send(DeviceNotification::Tick {
                    position_ms,
                    duration_ms,
                });
            }
        }
    }

    async fn refresh_loop(self: Arc<Self>, venue_id: String, mut expires_at: chrono::DateTime<chrono::Utc>) {
        loop {
            let until_expiry = (expires_at - chrono::Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            sleep(until_expiry.saturating_sub(self.config.refresh_margin)).await;

            if !*self.running.read().await {
                break;
            }

            match self.credentials.refresh(&venue_id).await {
                Ok(creds) => {
                    expires_at = creds.expires_at;
                    if let Err(e) = self.engine.connect(creds).await {
                        warn!("Engine reconnect after token refresh failed: {}", e);
                    } else {
                        debug!("Device token refreshed, next expiry {}", expires_at);
                    }
                }
                Err(e) => {
                    warn!("Token refresh failed, retrying in 30s: {}", e);
                    sleep(Duration::from_secs(30)).await;
                }
            }
        }
    }
}

fn map_connect_error(e: EngineError) -> Error {
    match e {
        EngineError::RestrictedTier => Error::DeviceInit(
            "the playback engine account does not permit remote control; \
             a premium subscription tier is required"
                .to_string(),
        ),
        EngineError::Auth(m) => Error::DeviceInit(format!("engine rejected credentials: {}", m)),
        other => Error::DeviceInit(format!("engine connection failed: {}", other)),
    }
}

fn map_command_error(e: EngineError) -> Error {
    match e {
        EngineError::RestrictedTier => map_connect_error(e),
        other => Error::Internal(format!("device command failed: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::credentials::{CredentialsProvider, DeviceCredentials};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine stub that fails play with NoActiveOutput until activated
    struct InactiveOutputEngine {
        activated: AtomicUsize,
        plays: AtomicUsize,
        events: broadcast::Sender<EngineState>,
    }

    impl InactiveOutputEngine {
        fn new() -> Self {
            let (events, _) = broadcast::channel(8);
            Self {
                activated: AtomicUsize::new(0),
                plays: AtomicUsize::new(0),
                events,
            }
        }
    }

    #[async_trait]
    impl RemoteEngine for InactiveOutputEngine {
        async fn connect(&self, _c: DeviceCredentials) -> std::result::Result<(), EngineError> {
            Ok(())
        }
        async fn is_ready(&self) -> bool {
            true
        }
        async fn play(&self, _t: &Track, _p: u64) -> std::result::Result<(), EngineError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            if self.activated.load(Ordering::SeqCst) == 0 {
                Err(EngineError::NoActiveOutput)
            } else {
                Ok(())
            }
        }
        async fn activate(&self) -> std::result::Result<(), EngineError> {
            self.activated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn pause(&self) -> std::result::Result<(), EngineError> {
            Err(EngineError::Transport("nope".to_string()))
        }
        async fn resume(&self) -> std::result::Result<(), EngineError> {
            Ok(())
        }
        async fn seek(&self, _p: u64) -> std::result::Result<(), EngineError> {
            Ok(())
        }
        async fn set_volume(&self, _v: f32) -> std::result::Result<(), EngineError> {
            Ok(())
        }
        fn state_events(&self) -> broadcast::Receiver<EngineState> {
            self.events.subscribe()
        }
        async fn current_state(&self) -> EngineState {
            EngineState::stopped()
        }
    }

    struct StaticCredentials;

    #[async_trait]
    impl CredentialsProvider for StaticCredentials {
        async fn get(&self, _venue_id: &str) -> rockola_common::Result<DeviceCredentials> {
            Ok(DeviceCredentials {
                access_token: "at".to_string(),
                refresh_token: "rt".to_string(),
                expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        }
        async fn refresh(&self, venue_id: &str) -> rockola_common::Result<DeviceCredentials> {
            self.get(venue_id).await
        }
    }

    fn test_track() -> Track {
        Track {
            catalog_id: "cat:1".to_string(),
            title: "T".to_string(),
            artist: "A".to_string(),
            album: None,
            duration_ms: 10_000,
            artwork_url: None,
        }
    }

    #[tokio::test]
    async fn test_play_activates_and_retries_once() {
        let engine = Arc::new(InactiveOutputEngine::new());
        let adapter = DeviceAdapter::new(
            engine.clone(),
            Arc::new(StaticCredentials),
            DeviceConfig::default(),
        );

        adapter.play_track(&test_track(), 0).await.unwrap();
        assert_eq!(engine.activated.load(Ordering::SeqCst), 1);
        // One failed attempt plus exactly one retry
        assert_eq!(engine.plays.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transport_failures_are_absorbed() {
        let engine = Arc::new(InactiveOutputEngine::new());
        let adapter = DeviceAdapter::new(
            engine,
            Arc::new(StaticCredentials),
            DeviceConfig::default(),
        );
        // pause errors inside the engine; the adapter logs and carries on
        adapter.pause().await;
    }
}
