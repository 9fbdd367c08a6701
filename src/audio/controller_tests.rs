//! Tests for the playback controller against an in-memory session.

use std::{sync::Arc, time::Duration};

use {async_channel::unbounded, tokio::time::timeout};

use crate::{
    audio::{
        controller::{PlaybackController, progress_fraction},
        queue::RepeatMode,
        session::{MediaSession, PlayerState, SessionEvent, TransitionReason},
        test_session::FakeSession,
    },
    config::settings::UserSettings,
    library::models::Song,
    state::{AppState, AppStateEvent},
};

fn song(id: i64) -> Song {
    Song {
        id,
        file_path: format!("/music/{id}.flac"),
        file_name: format!("{id}.flac"),
        ..Song::default()
    }
}

fn songs(count: i64) -> Vec<Song> {
    (1..=count).map(song).collect()
}

fn controller_with(session: &Arc<FakeSession>) -> PlaybackController {
    let session: Arc<dyn MediaSession> = session.clone();
    PlaybackController::new(session, Arc::new(AppState::new()), &UserSettings::default())
}

fn queue_ids(controller: &PlaybackController) -> Vec<String> {
    controller
        .queue()
        .songs
        .iter()
        .map(|song| song.id.to_string())
        .collect()
}

#[test]
fn test_progress_fraction() {
    assert_eq!(progress_fraction(0, 0), 0.0);
    assert_eq!(progress_fraction(500, 0), 0.0);
    assert!((progress_fraction(50_000, 200_000) - 0.25).abs() < f32::EPSILON);
}

#[test]
fn test_play_queue_loads_session() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);

    controller.play_queue(songs(3), 1);

    assert_eq!(
        session.calls(),
        ["set_media_items(1, 0)", "prepare", "play"]
    );
    assert_eq!(session.item_ids(), ["1", "2", "3"]);
    assert_eq!(controller.queue().current_index, 1);
    assert_eq!(controller.current_song().map(|s| s.id), Some(2));
    assert_eq!(controller.app_state().current_song().map(|s| s.id), Some(2));
}

#[test]
fn test_play_queue_clamps_start_index() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);

    controller.play_queue(songs(2), 9);

    assert_eq!(session.calls()[0], "set_media_items(1, 0)");
    assert_eq!(controller.queue().current_index, 1);
}

#[test]
fn test_play_empty_queue_clears() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);
    controller.play_queue(songs(2), 0);

    controller.play_queue(Vec::new(), 0);

    assert!(session.item_ids().is_empty());
    assert!(controller.queue().songs.is_empty());
    assert_eq!(controller.app_state().current_song(), None);
    assert_eq!(session.calls().last().map(String::as_str), Some("clear_media_items"));
}

#[test]
fn test_play_song_replaces_queue() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);
    controller.play_queue(songs(3), 0);

    controller.play_song(song(42));

    assert_eq!(session.item_ids(), ["42"]);
    assert_eq!(queue_ids(&controller), ["42"]);
}

#[test]
fn test_load_generation_changes_only_when_a_song_is_started() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);
    assert_eq!(controller.load_generation(), 0);

    controller.play_queue(songs(3), 0);
    controller.play_at_index(0);
    assert_eq!(controller.load_generation(), 2);

    controller.toggle_shuffle();
    controller.add_to_queue(song(9));
    controller.reorder_queue(1, 2);
    controller.play_at_index(7);
    assert_eq!(controller.load_generation(), 2);
}

#[test]
fn test_play_at_index() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);
    controller.play_queue(songs(3), 0);

    controller.play_at_index(2);
    assert_eq!(controller.queue().current_index, 2);
    assert!(session.calls().contains(&"seek_to_media_item(2, 0)".to_string()));

    let calls_before = session.calls().len();
    controller.play_at_index(7);
    assert_eq!(session.calls().len(), calls_before);
    assert_eq!(controller.queue().current_index, 2);
}

#[test]
fn test_queue_edits_mirror_onto_session() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);
    controller.play_queue(songs(3), 0);

    controller.add_to_queue(song(4));
    controller.add_to_queue_next(song(5));
    assert_eq!(session.item_ids(), ["1", "5", "2", "3", "4"]);
    assert_eq!(queue_ids(&controller), session.item_ids());

    controller.reorder_queue(4, 0);
    assert_eq!(session.item_ids(), ["4", "1", "5", "2", "3"]);
    assert_eq!(queue_ids(&controller), session.item_ids());
    assert_eq!(controller.queue().current_index, 1);

    controller.remove_from_queue(2);
    assert_eq!(session.item_ids(), ["4", "1", "2", "3"]);
    assert_eq!(queue_ids(&controller), session.item_ids());

    controller.clear_queue();
    assert!(session.item_ids().is_empty());
    assert!(controller.queue().songs.is_empty());
}

#[test]
fn test_ignored_queue_edits_do_not_reach_session() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);
    controller.play_queue(songs(2), 0);
    let calls_before = session.calls().len();

    controller.remove_from_queue(5);
    controller.reorder_queue(0, 0);
    controller.reorder_queue(0, 9);

    assert_eq!(session.calls().len(), calls_before);
}

#[test]
fn test_toggle_shuffle_rebuilds_session_items() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);
    controller.play_queue(songs(6), 2);
    session.state.lock().position_ms = 42_000;

    assert!(controller.toggle_shuffle());
    assert_eq!(session.calls().last().map(String::as_str), Some("set_media_items(0, 42000)"));
    assert_eq!(queue_ids(&controller), session.item_ids());
    assert_eq!(controller.current_song().map(|s| s.id), Some(3));
    assert!(controller.app_state().get_playback().queue.shuffle_enabled);

    assert!(!controller.toggle_shuffle());
    assert_eq!(session.item_ids(), ["1", "2", "3", "4", "5", "6"]);
    assert_eq!(controller.queue().current_index, 2);
    assert_eq!(session.calls().last().map(String::as_str), Some("set_media_items(2, 42000)"));
}

#[test]
fn test_toggle_shuffle_on_empty_queue_skips_session() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);

    assert!(controller.toggle_shuffle());
    assert!(session.calls().is_empty());
    assert!(controller.queue().shuffle_enabled);
}

#[test]
fn test_cycle_repeat_mode_forwards_to_session() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);

    assert_eq!(controller.cycle_repeat_mode(), RepeatMode::All);
    assert_eq!(controller.cycle_repeat_mode(), RepeatMode::One);
    assert_eq!(controller.cycle_repeat_mode(), RepeatMode::Off);

    assert_eq!(
        session.calls(),
        [
            "set_repeat_mode(all)",
            "set_repeat_mode(one)",
            "set_repeat_mode(off)"
        ]
    );
    assert_eq!(session.state.lock().repeat_mode, RepeatMode::Off);
}

#[test]
fn test_skip_to_previous_restarts_past_threshold() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);
    controller.play_queue(songs(3), 1);

    controller.app_state().update_progress(5_000, 0.1);
    controller.skip_to_previous();
    assert_eq!(session.calls().last().map(String::as_str), Some("seek_to(0)"));
    assert_eq!(controller.app_state().position_ms(), 0);

    controller.skip_to_previous();
    assert_eq!(session.calls().last().map(String::as_str), Some("seek_to_previous"));
}

#[test]
fn test_skip_to_previous_at_threshold_moves_back() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);
    controller.play_queue(songs(3), 1);

    controller.app_state().update_progress(3_000, 0.0);
    controller.skip_to_previous();

    assert_eq!(session.calls().last().map(String::as_str), Some("seek_to_previous"));
}

#[test]
fn test_seek_publishes_immediately() {
    let session = Arc::new(FakeSession::new());
    session.state.lock().duration_ms = Some(200_000);
    let controller = controller_with(&session);
    assert_eq!(controller.app_state().duration_ms(), 200_000);

    controller.seek_to_progress(0.5);
    assert_eq!(session.state.lock().position_ms, 100_000);
    let playback = controller.app_state().get_playback();
    assert_eq!(playback.position_ms, 100_000);
    assert!((playback.progress - 0.5).abs() < f32::EPSILON);

    controller.seek_to_progress(1.5);
    assert_eq!(session.state.lock().position_ms, 200_000);
    controller.seek_to_progress(-1.0);
    assert_eq!(session.state.lock().position_ms, 0);
}

#[test]
fn test_toggle_play_pause_uses_published_state() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);

    controller.toggle_play_pause();
    assert_eq!(session.calls().last().map(String::as_str), Some("play"));

    controller.app_state().update_playing(true);
    controller.toggle_play_pause();
    assert_eq!(session.calls().last().map(String::as_str), Some("pause"));
}

#[test]
fn test_transition_syncs_queue_index_and_duration() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);
    controller.play_queue(songs(3), 0);

    {
        let mut state = session.state.lock();
        state.index = 2;
        state.duration_ms = Some(180_000);
    }
    controller.handle_event(SessionEvent::MediaItemTransition {
        media_id: Some("3".to_string()),
        reason: TransitionReason::Auto,
    });

    assert_eq!(controller.queue().current_index, 2);
    assert_eq!(controller.app_state().current_song().map(|s| s.id), Some(3));
    assert_eq!(controller.app_state().duration_ms(), 180_000);
}

#[test]
fn test_ready_refreshes_duration() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);

    session.state.lock().duration_ms = Some(90_000);
    controller.handle_event(SessionEvent::PlaybackStateChanged(PlayerState::Buffering));
    assert_eq!(controller.app_state().duration_ms(), 0);

    controller.handle_event(SessionEvent::PlaybackStateChanged(PlayerState::Ready));
    assert_eq!(controller.app_state().duration_ms(), 90_000);

    session.state.lock().duration_ms = Some(0);
    controller.handle_event(SessionEvent::PlaybackStateChanged(PlayerState::Ready));
    assert_eq!(controller.app_state().duration_ms(), 0);
}

#[test]
fn test_up_next() {
    let session = Arc::new(FakeSession::new());
    let controller = controller_with(&session);
    controller.play_queue(songs(6), 1);

    let upcoming: Vec<i64> = controller.up_next(3).iter().map(|s| s.id).collect();
    assert_eq!(upcoming, [3, 4, 5]);
}

#[tokio::test]
async fn test_progress_polling_follows_playing_state() {
    let session = Arc::new(FakeSession::new());
    {
        let mut state = session.state.lock();
        state.position_ms = 30_000;
        state.duration_ms = Some(120_000);
    }
    let settings = UserSettings {
        progress_interval_ms: 10,
        ..UserSettings::default()
    };
    let dyn_session: Arc<dyn MediaSession> = session.clone();
    let controller = PlaybackController::new(dyn_session, Arc::new(AppState::new()), &settings);
    let mut events = controller.app_state().subscribe();

    controller.handle_event(SessionEvent::IsPlayingChanged(true));
    assert!(controller.is_tracking_progress());
    assert!(controller.app_state().is_playing());

    let progress = timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(AppStateEvent::ProgressChanged {
                position_ms,
                progress,
            }) = events.recv().await
            {
                return (position_ms, progress);
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(progress.0, 30_000);
    assert!((progress.1 - 0.25).abs() < f32::EPSILON);

    controller.handle_event(SessionEvent::IsPlayingChanged(false));
    assert!(!controller.is_tracking_progress());
    assert!(!controller.app_state().is_playing());
}

#[tokio::test]
async fn test_event_loop_consumes_session_callbacks() {
    let (sender, receiver) = unbounded();
    let session = Arc::new(FakeSession::with_events(sender, 7));
    let controller = controller_with(&session);

    controller.play_queue(songs(3), 0);
    session.seek_to_next();

    // Drain what the session reported, then close the channel.
    let pending: Vec<SessionEvent> = std::iter::from_fn(|| receiver.try_recv().ok()).collect();
    assert!(pending.contains(&SessionEvent::IsPlayingChanged(true)));

    let (replay_tx, replay_rx) = unbounded();
    for event in pending {
        replay_tx.send(event).await.unwrap();
    }
    drop(replay_tx);

    timeout(Duration::from_secs(2), controller.run_event_loop(replay_rx))
        .await
        .unwrap();

    assert!(controller.app_state().is_playing());
    assert_eq!(controller.queue().current_index, 1);
    assert_eq!(controller.app_state().current_song().map(|s| s.id), Some(2));
    assert!(!controller.is_tracking_progress());
}
