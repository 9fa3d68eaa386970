//! Shared test fixtures: a scripted mock engine and session setup

use async_trait::async_trait;
use rockola_common::db::init_memory_database;
use rockola_common::model::Track;
use rockola_common::Result;
use rockola_sc::device::{
    CredentialsProvider, DeviceAdapter, DeviceConfig, DeviceCredentials, EngineError, EngineState,
    RemoteEngine,
};
use rockola_sc::fanout::{Room, VenueRooms};
use rockola_sc::{Coordinator, CoordinatorConfig, SharedState};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{sleep, Instant};
use uuid::Uuid;

pub const VENUE: &str = "venue-1";

/// Engine whose reported state is entirely test-scripted. Commands are
/// recorded and produce no state changes on their own.
pub struct MockEngine {
    events: broadcast::Sender<EngineState>,
    state: RwLock<EngineState>,
    plays: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            events,
            state: RwLock::new(EngineState::stopped()),
            plays: Mutex::new(Vec::new()),
        })
    }

    /// Script one engine state report
    pub async fn push_state(&self, state: EngineState) {
        *self.state.write().await = state.clone();
        let _ = self.events.send(state);
    }

    /// Convenience: report transport for a catalog id
    pub async fn report(&self, catalog_id: &str, is_playing: bool, position_ms: u64) {
        self.push_state(EngineState {
            track_id: Some(catalog_id.to_string()),
            is_playing,
            position_ms,
            duration_ms: 180_000,
        })
        .await;
    }

    pub async fn played(&self) -> Vec<String> {
        self.plays.lock().await.clone()
    }
}

#[async_trait]
impl RemoteEngine for MockEngine {
    async fn connect(&self, _credentials: DeviceCredentials) -> std::result::Result<(), EngineError> {
        Ok(())
    }
    async fn is_ready(&self) -> bool {
        true
    }
    async fn play(&self, track: &Track, _position_ms: u64) -> std::result::Result<(), EngineError> {
        self.plays.lock().await.push(track.catalog_id.clone());
        Ok(())
    }
    async fn activate(&self) -> std::result::Result<(), EngineError> {
        Ok(())
    }
    async fn pause(&self) -> std::result::Result<(), EngineError> {
        Ok(())
    }
    async fn resume(&self) -> std::result::Result<(), EngineError> {
        Ok(())
    }
    async fn seek(&self, _position_ms: u64) -> std::result::Result<(), EngineError> {
        Ok(())
    }
    async fn set_volume(&self, _volume: f32) -> std::result::Result<(), EngineError> {
        Ok(())
    }
    fn state_events(&self) -> broadcast::Receiver<EngineState> {
        self.events.subscribe()
    }
    async fn current_state(&self) -> EngineState {
        self.state.read().await.clone()
    }
}

pub struct StaticCredentials;

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn get(&self, _venue_id: &str) -> Result<DeviceCredentials> {
        Ok(DeviceCredentials {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
        })
    }
    async fn refresh(&self, venue_id: &str) -> Result<DeviceCredentials> {
        self.get(venue_id).await
    }
}

pub struct TestSession {
    pub coordinator: Arc<Coordinator>,
    pub engine: Arc<MockEngine>,
    pub state: Arc<SharedState>,
    pub room: Room,
    pub db: SqlitePool,
}

/// Build a session wired to the mock engine. The adapter's own tick and the
/// coordinator's periodic poll are slowed to an hour so tests drive every
/// transport observation explicitly through scripted engine events. The
/// session is NOT attached; tests call attach when their store state is
/// ready.
pub async fn spawn_session(config: CoordinatorConfig) -> TestSession {
    let db = init_memory_database().await.unwrap();
    let rooms = VenueRooms::new(256);
    let room = rooms.join(VENUE).await;
    let state = Arc::new(SharedState::new());
    let engine = MockEngine::new();

    let device_config = DeviceConfig {
        tick_interval: Duration::from_secs(3600),
        ..DeviceConfig::default()
    };
    let adapter = Arc::new(DeviceAdapter::new(
        engine.clone(),
        Arc::new(StaticCredentials),
        device_config,
    ));
    adapter.initialize(VENUE).await.unwrap();

    let coordinator = Arc::new(Coordinator::new(
        VENUE,
        db.clone(),
        adapter,
        Arc::clone(&state),
        room.clone(),
        config,
    ));

    TestSession {
        coordinator,
        engine,
        state,
        room,
        db,
    }
}

/// Coordinator config with the periodic poll effectively disabled, so
/// scripted engine events are the only transport observations
pub fn scripted_config() -> CoordinatorConfig {
    CoordinatorConfig {
        check_interval: Duration::from_secs(3600),
        ..CoordinatorConfig::default()
    }
}

pub fn track(n: u32) -> Track {
    Track {
        catalog_id: format!("cat:{}", n),
        title: format!("Track {}", n),
        artist: "Artist".to_string(),
        album: None,
        duration_ms: 180_000,
        artwork_url: None,
    }
}

/// Poll until the coordinator's current item matches, or time out
pub async fn wait_for_current(
    coordinator: &Coordinator,
    expected: Option<Uuid>,
    timeout_ms: u64,
) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if coordinator.snapshot().await.current_item_id == expected {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(25)).await;
    }
}

/// Poll until the venue history reaches the given length, or time out
pub async fn wait_for_history_len(coordinator: &Coordinator, len: usize, timeout_ms: u64) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if coordinator.history(50).await.map(|h| h.len()).unwrap_or(0) == len {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(25)).await;
    }
}

/// Poll until the restoration settle window has elapsed, or time out
pub async fn wait_for_settled(state: &SharedState, timeout_ms: u64) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if !state.is_restoring().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(25)).await;
    }
}
