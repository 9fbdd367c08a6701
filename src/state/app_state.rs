//! Observable playback state.
//!
//! The playback controller writes here; hosts read the latest
//! [`PlaybackSnapshot`] or subscribe to [`AppStateEvent`]s.

use std::sync::Arc;

use {
    parking_lot::RwLock,
    serde::{Deserialize, Serialize},
    tokio::sync::broadcast::{Receiver, Sender, channel},
};

use crate::{
    audio::queue::{QueueSnapshot, RepeatMode},
    library::models::Song,
};

/// Capacity of the state event channel. Progress ticks dominate traffic, so
/// slow subscribers lag rather than block.
const EVENT_CAPACITY: usize = 64;

/// Everything a player screen shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    /// Whether audio is playing.
    pub is_playing: bool,
    /// Position in the current song.
    pub position_ms: u64,
    /// Position as a fraction of the duration, 0 when the duration is unknown.
    pub progress: f32,
    /// Duration of the current song, 0 when unknown.
    pub duration_ms: u64,
    /// The current song.
    pub current_song: Option<Song>,
    /// The queue.
    pub queue: QueueSnapshot,
}

/// Application state change events.
#[derive(Debug, Clone, PartialEq)]
pub enum AppStateEvent {
    /// Playback started or stopped.
    PlayingChanged(bool),
    /// Position advanced or was sought.
    ProgressChanged {
        /// Position in the current song.
        position_ms: u64,
        /// Position as a fraction of the duration.
        progress: f32,
    },
    /// The duration of the current song became known.
    DurationChanged(u64),
    /// Another song became current.
    CurrentSongChanged(Option<Song>),
    /// The queue content or order changed.
    QueueChanged(QueueSnapshot),
    /// Shuffle was toggled.
    ShuffleChanged(bool),
    /// The repeat mode changed.
    RepeatModeChanged(RepeatMode),
}

/// Central state container with thread-safe access.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Current playback information.
    playback: Arc<RwLock<PlaybackSnapshot>>,
    /// Broadcast channel for state change notifications.
    state_tx: Sender<AppStateEvent>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Creates a new application state instance.
    #[must_use]
    pub fn new() -> Self {
        let (state_tx, _) = channel(EVENT_CAPACITY);
        Self {
            playback: Arc::new(RwLock::new(PlaybackSnapshot::default())),
            state_tx,
        }
    }

    fn emit(&self, event: AppStateEvent) {
        let _ = self.state_tx.send(event);
    }

    /// Publishes whether audio is playing.
    pub fn update_playing(&self, is_playing: bool) {
        let changed = {
            let mut playback = self.playback.write();
            let changed = playback.is_playing != is_playing;
            playback.is_playing = is_playing;
            changed
        };
        if changed {
            self.emit(AppStateEvent::PlayingChanged(is_playing));
        }
    }

    /// Publishes the playback position.
    pub fn update_progress(&self, position_ms: u64, progress: f32) {
        {
            let mut playback = self.playback.write();
            playback.position_ms = position_ms;
            playback.progress = progress;
        }
        self.emit(AppStateEvent::ProgressChanged {
            position_ms,
            progress,
        });
    }

    /// Publishes the duration of the current song.
    pub fn update_duration(&self, duration_ms: u64) {
        let changed = {
            let mut playback = self.playback.write();
            let changed = playback.duration_ms != duration_ms;
            playback.duration_ms = duration_ms;
            changed
        };
        if changed {
            self.emit(AppStateEvent::DurationChanged(duration_ms));
        }
    }

    /// Publishes the queue, and the current song, shuffle flag and repeat
    /// mode when they differ from what was published before.
    pub fn update_queue(&self, queue: QueueSnapshot) {
        let current_song = queue.songs.get(queue.current_index).cloned();
        let (song_changed, shuffle_changed, repeat_changed) = {
            let mut playback = self.playback.write();
            let song_changed = playback.current_song != current_song;
            let shuffle_changed = playback.queue.shuffle_enabled != queue.shuffle_enabled;
            let repeat_changed = playback.queue.repeat_mode != queue.repeat_mode;
            playback.current_song = current_song.clone();
            playback.queue = queue.clone();
            (song_changed, shuffle_changed, repeat_changed)
        };

        let shuffle_enabled = queue.shuffle_enabled;
        let repeat_mode = queue.repeat_mode;
        self.emit(AppStateEvent::QueueChanged(queue));
        if song_changed {
            self.emit(AppStateEvent::CurrentSongChanged(current_song));
        }
        if shuffle_changed {
            self.emit(AppStateEvent::ShuffleChanged(shuffle_enabled));
        }
        if repeat_changed {
            self.emit(AppStateEvent::RepeatModeChanged(repeat_mode));
        }
    }

    /// Subscribes to application state changes.
    pub fn subscribe(&self) -> Receiver<AppStateEvent> {
        self.state_tx.subscribe()
    }

    /// Copies the current playback state.
    pub fn get_playback(&self) -> PlaybackSnapshot {
        self.playback.read().clone()
    }

    /// Whether audio is playing.
    pub fn is_playing(&self) -> bool {
        self.playback.read().is_playing
    }

    /// Last published position.
    pub fn position_ms(&self) -> u64 {
        self.playback.read().position_ms
    }

    /// Last published duration.
    pub fn duration_ms(&self) -> u64 {
        self.playback.read().duration_ms
    }

    /// The current song.
    pub fn current_song(&self) -> Option<Song> {
        self.playback.read().current_song.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        audio::queue::{QueueSnapshot, RepeatMode},
        library::models::Song,
        state::{AppState, AppStateEvent},
    };

    fn queue(ids: &[i64], current_index: usize) -> QueueSnapshot {
        QueueSnapshot {
            songs: ids
                .iter()
                .map(|&id| Song {
                    id,
                    ..Song::default()
                })
                .collect(),
            current_index,
            ..QueueSnapshot::default()
        }
    }

    #[test]
    fn test_app_state_creation() {
        let app_state = AppState::new();
        let playback = app_state.get_playback();
        assert!(!playback.is_playing);
        assert_eq!(playback.duration_ms, 0);
        assert!(app_state.current_song().is_none());
    }

    #[test]
    fn test_playing_emits_only_on_change() {
        let app_state = AppState::new();
        let mut events = app_state.subscribe();

        app_state.update_playing(true);
        app_state.update_playing(true);
        app_state.update_playing(false);

        assert_eq!(events.try_recv().unwrap(), AppStateEvent::PlayingChanged(true));
        assert_eq!(events.try_recv().unwrap(), AppStateEvent::PlayingChanged(false));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_queue_update_derives_current_song() {
        let app_state = AppState::new();
        let mut events = app_state.subscribe();

        app_state.update_queue(queue(&[1, 2], 1));
        assert!(matches!(events.try_recv().unwrap(), AppStateEvent::QueueChanged(_)));
        match events.try_recv().unwrap() {
            AppStateEvent::CurrentSongChanged(Some(song)) => assert_eq!(song.id, 2),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(events.try_recv().is_err());

        let mut shuffled = queue(&[2, 1], 0);
        shuffled.shuffle_enabled = true;
        shuffled.repeat_mode = RepeatMode::All;
        app_state.update_queue(shuffled);
        assert!(matches!(events.try_recv().unwrap(), AppStateEvent::QueueChanged(_)));
        assert_eq!(events.try_recv().unwrap(), AppStateEvent::ShuffleChanged(true));
        assert_eq!(
            events.try_recv().unwrap(),
            AppStateEvent::RepeatModeChanged(RepeatMode::All)
        );

        app_state.update_queue(QueueSnapshot::default());
        assert!(app_state.current_song().is_none());
    }

    #[test]
    fn test_progress_and_duration() {
        let app_state = AppState::new();
        app_state.update_duration(200_000);
        app_state.update_progress(50_000, 0.25);
        assert_eq!(app_state.position_ms(), 50_000);
        assert_eq!(app_state.duration_ms(), 200_000);
        assert!((app_state.get_playback().progress - 0.25).abs() < f32::EPSILON);
    }
}
