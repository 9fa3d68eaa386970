//! Software playback engine
//!
//! Stands in for the remote engine when no hardware bridge is configured:
//! advances a clock instead of producing audio, and reproduces the remote
//! engine's observable end-of-track behavior (a transition to not-playing
//! with the position snapped back to zero). Useful for development and for
//! venues driving an external display only.

use async_trait::async_trait;
use rockola_common::model::Track;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::credentials::DeviceCredentials;
use super::engine::{EngineError, EngineState, RemoteEngine};

struct SimTransport {
    track: Option<Track>,
    playing: bool,
    base_position_ms: u64,
    resumed_at: Instant,
}

impl SimTransport {
    fn position_ms(&self) -> u64 {
        if self.playing {
            self.base_position_ms + self.resumed_at.elapsed().as_millis() as u64
        } else {
            self.base_position_ms
        }
    }

    fn state(&self) -> EngineState {
        EngineState {
            track_id: self.track.as_ref().map(|t| t.catalog_id.clone()),
            is_playing: self.playing,
            position_ms: self.position_ms(),
            duration_ms: self.track.as_ref().map(|t| t.duration_ms).unwrap_or(0),
        }
    }
}

pub struct SimulatedEngine {
    connected: RwLock<bool>,
    transport: RwLock<SimTransport>,
    volume: RwLock<f32>,
    events: broadcast::Sender<EngineState>,
}

impl SimulatedEngine {
    /// Create the engine and start its end-of-track watcher. The watcher
    /// holds a weak reference and exits when the engine is dropped.
    pub fn spawn() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        let engine = Arc::new(Self {
            connected: RwLock::new(false),
            transport: RwLock::new(SimTransport {
                track: None,
                playing: false,
                base_position_ms: 0,
                resumed_at: Instant::now(),
            }),
            volume: RwLock::new(0.75),
            events,
        });

        let weak: Weak<Self> = Arc::downgrade(&engine);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(250));
            loop {
                ticker.tick().await;
                let Some(engine) = weak.upgrade() else { break };
                engine.check_track_end().await;
            }
        });

        engine
    }

    async fn check_track_end(&self) {
        let mut guard = self.transport.write().await;
        let Some(track) = guard.track.clone() else { return };
        if guard.playing && guard.position_ms() >= track.duration_ms {
            debug!("Simulated playback reached end of {}", track.catalog_id);
            guard.playing = false;
            guard.base_position_ms = 0;
            // End is reported the way the remote engine reports it:
            // not playing, position zero, track identity still set
            let _ = self.events.send(guard.state());
        }
    }

    async fn emit_state(&self) {
        let guard = self.transport.read().await;
        let _ = self.events.send(guard.state());
    }
}

#[async_trait]
impl RemoteEngine for SimulatedEngine {
    async fn connect(&self, _credentials: DeviceCredentials) -> Result<(), EngineError> {
        *self.connected.write().await = true;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        *self.connected.read().await
    }

    async fn play(&self, track: &Track, position_ms: u64) -> Result<(), EngineError> {
        if !*self.connected.read().await {
            return Err(EngineError::Transport("engine not connected".to_string()));
        }
        {
            let mut guard = self.transport.write().await;
            guard.track = Some(track.clone());
            guard.playing = true;
            guard.base_position_ms = position_ms;
            guard.resumed_at = Instant::now();
        }
        self.emit_state().await;
        Ok(())
    }

    async fn activate(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn pause(&self) -> Result<(), EngineError> {
        {
            let mut guard = self.transport.write().await;
            guard.base_position_ms = guard.position_ms();
            guard.playing = false;
        }
        self.emit_state().await;
        Ok(())
    }

    async fn resume(&self) -> Result<(), EngineError> {
        {
            let mut guard = self.transport.write().await;
            if guard.track.is_some() {
                guard.playing = true;
                guard.resumed_at = Instant::now();
            }
        }
        self.emit_state().await;
        Ok(())
    }

    async fn seek(&self, position_ms: u64) -> Result<(), EngineError> {
        {
            let mut guard = self.transport.write().await;
            guard.base_position_ms = position_ms;
            guard.resumed_at = Instant::now();
        }
        self.emit_state().await;
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<(), EngineError> {
        *self.volume.write().await = volume;
        Ok(())
    }

    fn state_events(&self) -> broadcast::Receiver<EngineState> {
        self.events.subscribe()
    }

    async fn current_state(&self) -> EngineState {
        self.transport.read().await.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> DeviceCredentials {
        DeviceCredentials {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
        }
    }

    fn short_track() -> Track {
        Track {
            catalog_id: "cat:short".to_string(),
            title: "Short".to_string(),
            artist: "A".to_string(),
            album: None,
            duration_ms: 300,
            artwork_url: None,
        }
    }

    #[tokio::test]
    async fn test_play_requires_connection() {
        let engine = SimulatedEngine::spawn();
        let err = engine.play(&short_track(), 0).await.unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));
    }

    #[tokio::test]
    async fn test_end_of_track_reports_stopped_at_zero() {
        let engine = SimulatedEngine::spawn();
        engine.connect(creds()).await.unwrap();
        let mut events = engine.state_events();

        engine.play(&short_track(), 0).await.unwrap();
        // First event: playing
        let started = events.recv().await.unwrap();
        assert!(started.is_playing);

        // The watcher reports the end the way the remote engine does
        let ended = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("end event within deadline")
            .unwrap();
        assert!(!ended.is_playing);
        assert_eq!(ended.position_ms, 0);
        assert_eq!(ended.track_id.as_deref(), Some("cat:short"));
    }

    #[tokio::test]
    async fn test_pause_preserves_position() {
        let engine = SimulatedEngine::spawn();
        engine.connect(creds()).await.unwrap();
        let track = Track {
            duration_ms: 60_000,
            ..short_track()
        };
        engine.play(&track, 5000).await.unwrap();
        engine.pause().await.unwrap();

        let state = engine.current_state().await;
        assert!(!state.is_playing);
        assert!(state.position_ms >= 5000);
        assert!(state.position_ms < 6000);
    }
}
