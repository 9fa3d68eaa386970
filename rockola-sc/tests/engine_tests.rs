//! End-to-end coordination tests against a scripted engine
//!
//! Drives the full path: engine state events flow through the device
//! adapter into the aggregator and the end-of-track detector, and queue
//! advancement lands in the store and the venue room.

mod helpers;

use helpers::{
    scripted_config, spawn_session, track, wait_for_current, wait_for_history_len,
    wait_for_settled, VENUE,
};
use rockola_common::events::VenueEvent;
use rockola_common::model::ItemStatus;
use rockola_sc::store;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test]
async fn test_end_of_track_advances_to_next_item() {
    let session = spawn_session(scripted_config()).await;
    let c = &session.coordinator;
    c.attach().await.unwrap();

    let a = c.enqueue(track(1), "alice").await.unwrap();
    let b = c.enqueue(track(2), "bob").await.unwrap();
    c.play_next().await.unwrap();
    assert_eq!(c.snapshot().await.current_item_id, Some(a.id));

    // Real playback, then the engine's end shape: not playing, position 0
    session.engine.report("cat:1", true, 5000).await;
    session.engine.report("cat:1", true, 9800).await;
    session.engine.report("cat:1", false, 0).await;

    let advanced = wait_for_current(c, Some(b.id), 2000).await;
    assert!(advanced, "coordinator should advance to the next item");

    // A is history, B is current, nothing pending
    let history = c.history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, a.id);
    assert_eq!(history[0].status, ItemStatus::Played);
    assert!(c.queue().await.unwrap().is_empty());

    // The device was told to play both items
    let played = session.engine.played().await;
    assert_eq!(played, vec!["cat:1".to_string(), "cat:2".to_string()]);
}

#[tokio::test]
async fn test_load_transient_does_not_advance() {
    let session = spawn_session(scripted_config()).await;
    let c = &session.coordinator;
    c.attach().await.unwrap();

    let a = c.enqueue(track(1), "alice").await.unwrap();
    c.enqueue(track(2), "bob").await.unwrap();
    c.play_next().await.unwrap();

    // The device stutters during load: a brief playing report below the
    // progress threshold, then a stopped report at zero
    session.engine.report("cat:1", true, 500).await;
    session.engine.report("cat:1", false, 0).await;
    sleep(Duration::from_millis(300)).await;

    assert_eq!(c.snapshot().await.current_item_id, Some(a.id));
    assert_eq!(c.queue().await.unwrap().len(), 1);
    assert!(c.history(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_end_is_detected_exactly_once() {
    let session = spawn_session(scripted_config()).await;
    let c = &session.coordinator;
    c.attach().await.unwrap();

    c.enqueue(track(1), "alice").await.unwrap();
    let b = c.enqueue(track(2), "bob").await.unwrap();
    c.play_next().await.unwrap();

    session.engine.report("cat:1", true, 5000).await;
    session.engine.report("cat:1", false, 0).await;

    let advanced = wait_for_current(c, Some(b.id), 2000).await;
    assert!(advanced);

    // Duplicate stopped reports must not advance past B: detection is
    // rearmed per item and B has not produced a playing observation yet
    session.engine.report("cat:1", false, 0).await;
    session.engine.report("cat:1", false, 0).await;
    sleep(Duration::from_millis(300)).await;

    assert_eq!(c.snapshot().await.current_item_id, Some(b.id));
    assert_eq!(c.history(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_restoration_suppresses_advancement() {
    let mut config = scripted_config();
    config.settle_delay = Duration::from_millis(400);
    let session = spawn_session(config).await;
    let c = &session.coordinator;

    // Another session already started playback venue-wide
    let a = store::enqueue(&session.db, VENUE, &track(1), "alice")
        .await
        .unwrap();
    store::enqueue(&session.db, VENUE, &track(2), "bob")
        .await
        .unwrap();
    store::set_current_playing(&session.db, VENUE, a.id)
        .await
        .unwrap();

    // Attach reattaches the device without re-marking the queue
    c.attach().await.unwrap();
    assert!(session.state.is_restoring().await);
    assert_eq!(c.snapshot().await.current_item_id, Some(a.id));

    // The exact end-of-track-triggering sequence inside the settle window
    session.engine.report("cat:1", true, 5000).await;
    session.engine.report("cat:1", true, 9800).await;
    session.engine.report("cat:1", false, 0).await;
    sleep(Duration::from_millis(200)).await;

    // Zero advancements while restoring
    assert_eq!(c.snapshot().await.current_item_id, Some(a.id));
    assert!(c.history(10).await.unwrap().is_empty());

    // After the settle window the same sequence advances exactly once
    let settled = wait_for_settled(&session.state, 2000).await;
    assert!(settled);

    session.engine.report("cat:1", true, 5000).await;
    session.engine.report("cat:1", true, 9800).await;
    session.engine.report("cat:1", false, 0).await;

    let advanced = wait_for_history_len(c, 1, 2000).await;
    assert!(advanced);
    assert_ne!(c.snapshot().await.current_item_id, Some(a.id));
}

#[tokio::test]
async fn test_restoration_does_not_remark_queue() {
    let session = spawn_session(scripted_config()).await;
    let c = &session.coordinator;

    let a = store::enqueue(&session.db, VENUE, &track(1), "alice")
        .await
        .unwrap();
    store::set_current_playing(&session.db, VENUE, a.id)
        .await
        .unwrap();

    c.attach().await.unwrap();

    // The device was reattached to the venue-wide item
    let played = session.engine.played().await;
    assert_eq!(played, vec!["cat:1".to_string()]);

    // The store's current pointer is untouched (no demote/promote cycle)
    let current = store::get_current(&session.db, VENUE).await.unwrap().unwrap();
    assert_eq!(current.id, a.id);
    assert!(c.history(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_full_session_scenario() {
    let session = spawn_session(scripted_config()).await;
    let c = &session.coordinator;
    c.attach().await.unwrap();

    let mut events = session.room.subscribe();

    // Enqueue A and B at positions 1 and 2
    let a = c.enqueue(track(1), "alice").await.unwrap();
    let b = c.enqueue(track(2), "bob").await.unwrap();
    assert_eq!(a.position, Some(1));
    assert_eq!(b.position, Some(2));

    // play_next: A playing, only B pending
    c.play_next().await.unwrap();
    assert_eq!(c.snapshot().await.current_item_id, Some(a.id));
    let queue = c.queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, b.id);

    // A ends: A to history, B playing, nothing pending
    session.engine.report("cat:1", true, 170_000).await;
    session.engine.report("cat:1", false, 0).await;
    assert!(wait_for_current(c, Some(b.id), 2000).await);
    assert!(c.queue().await.unwrap().is_empty());

    // B ends with nothing pending: coordinator goes idle and stays there
    session.engine.report("cat:2", true, 170_000).await;
    session.engine.report("cat:2", false, 0).await;
    assert!(wait_for_current(c, None, 2000).await);

    let history = c.history(10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|i| i.status == ItemStatus::Played));

    // No further advancement attempts while idle
    sleep(Duration::from_millis(300)).await;
    assert!(c.snapshot().await.current_item_id.is_none());

    // The room saw both track starts and the history updates
    let mut track_started = 0;
    let mut history_updates = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            VenueEvent::TrackStarted { .. } => track_started += 1,
            VenueEvent::HistoryUpdate => history_updates += 1,
            _ => {}
        }
    }
    assert_eq!(track_started, 2);
    assert_eq!(history_updates, 2);
}

#[tokio::test]
async fn test_vote_skip_signal_drives_advancement() {
    let mut config = scripted_config();
    config.skip_threshold = 2;
    let session = spawn_session(config).await;
    let c = &session.coordinator;
    c.attach().await.unwrap();

    let a = c.enqueue(track(1), "alice").await.unwrap();
    let b = c.enqueue(track(2), "bob").await.unwrap();
    c.play_next().await.unwrap();
    assert_eq!(c.snapshot().await.current_item_id, Some(a.id));

    c.vote_skip("customer-1").await;
    c.vote_skip("customer-2").await;

    // The venue-wide skip signal reaches the driving session's listener,
    // which advances the queue
    let advanced = wait_for_current(c, Some(b.id), 2000).await;
    assert!(advanced);

    let history = c.history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ItemStatus::Skipped);
}

#[tokio::test]
async fn test_detach_stops_advancement() {
    let session = spawn_session(scripted_config()).await;
    let c = &session.coordinator;
    c.attach().await.unwrap();

    c.enqueue(track(1), "alice").await.unwrap();
    c.enqueue(track(2), "bob").await.unwrap();
    let a = c.play_next().await.unwrap().unwrap();

    c.detach().await;
    // Give the loops time to observe the cleared running flag and exit
    sleep(Duration::from_millis(700)).await;

    session.engine.report("cat:1", true, 5000).await;
    session.engine.report("cat:1", false, 0).await;
    sleep(Duration::from_millis(300)).await;

    // No advancement after detach: the store still shows A playing
    let current = store::get_current(&session.db, VENUE).await.unwrap().unwrap();
    assert_eq!(current.id, a.id);
}
