//! Playback controller keeping the queue and the host player in lock-step.
//!
//! Every queue operation is applied to the [`QueueManager`] first and then
//! mirrored onto the [`MediaSession`], so indices in both stay equal. Player
//! callbacks flow back through [`PlaybackController::handle_event`], and the
//! resulting state is published through [`AppState`].

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    async_channel::Receiver,
    parking_lot::{Mutex, RwLock},
    tokio::{runtime::Handle, task::JoinHandle, time::sleep},
    tracing::{debug, warn},
};

use crate::{
    audio::{
        queue::{QueueManager, QueueSnapshot, RepeatMode},
        session::{MediaItem, MediaSession, PlayerState, SessionEvent},
    },
    config::settings::UserSettings,
    library::models::Song,
    state::AppState,
};

/// Fraction of `duration_ms` reached at `position_ms`, 0 for an unknown duration.
#[must_use]
pub fn progress_fraction(position_ms: u64, duration_ms: u64) -> f32 {
    if duration_ms == 0 {
        0.0
    } else {
        (position_ms as f64 / duration_ms as f64) as f32
    }
}

/// Drives a [`MediaSession`] from a [`QueueManager`].
pub struct PlaybackController {
    /// Host player.
    session: Arc<dyn MediaSession>,
    /// Queue state.
    queue: Arc<RwLock<QueueManager>>,
    /// Published state.
    app_state: Arc<AppState>,
    /// Delay between progress samples while playing.
    progress_interval: Duration,
    /// Position above which "previous" restarts the current song.
    restart_threshold_ms: u64,
    /// Progress polling task while playing.
    progress_task: Mutex<Option<JoinHandle<()>>>,
    /// Bumped each time playback is (re)started from a chosen song.
    load_generation: AtomicU64,
}

impl PlaybackController {
    /// Creates a controller and syncs the initial player state.
    ///
    /// Progress polling starts right away if the player is already playing
    /// and a Tokio runtime is available.
    pub fn new(
        session: Arc<dyn MediaSession>,
        app_state: Arc<AppState>,
        settings: &UserSettings,
    ) -> Self {
        let controller = Self {
            session,
            queue: Arc::new(RwLock::new(QueueManager::new())),
            app_state,
            progress_interval: Duration::from_millis(settings.progress_interval_ms.max(1)),
            restart_threshold_ms: settings.previous_restart_threshold_ms,
            progress_task: Mutex::new(None),
            load_generation: AtomicU64::new(0),
        };

        let is_playing = controller.session.is_playing();
        controller.app_state.update_playing(is_playing);
        controller.update_duration();
        if is_playing {
            controller.start_progress_updates();
        }
        controller
    }

    /// Published state.
    pub fn app_state(&self) -> &Arc<AppState> {
        &self.app_state
    }

    /// Copy of the queue.
    pub fn queue(&self) -> QueueSnapshot {
        self.queue.read().snapshot()
    }

    /// The current song.
    pub fn current_song(&self) -> Option<Song> {
        self.queue.read().current_song().cloned()
    }

    /// Up to `count` songs after the current one.
    pub fn up_next(&self, count: usize) -> Vec<Song> {
        self.queue
            .read()
            .up_next(count)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Counter that changes whenever `play_queue`, `play_song` or
    /// `play_at_index` starts a song, even the one already current.
    pub fn load_generation(&self) -> u64 {
        self.load_generation.load(Ordering::Acquire)
    }

    fn publish_queue(&self) {
        let snapshot = self.queue.read().snapshot();
        self.app_state.update_queue(snapshot);
    }

    fn media_items(queue: &QueueManager) -> Vec<MediaItem> {
        queue
            .entries()
            .iter()
            .map(|entry| MediaItem::from_song(&entry.song))
            .collect()
    }

    /// Applies one player callback.
    pub fn handle_event(&self, event: SessionEvent) {
        debug!("Session event: {:?}", event);
        match event {
            SessionEvent::IsPlayingChanged(playing) => {
                self.app_state.update_playing(playing);
                if playing {
                    self.start_progress_updates();
                } else {
                    self.stop_progress_updates();
                }
            }
            SessionEvent::MediaItemTransition { .. } => {
                let index = self.session.current_media_item_index();
                self.queue.write().update_current_index(index);
                self.publish_queue();
                self.update_duration();
            }
            SessionEvent::PlaybackStateChanged(PlayerState::Ready) => {
                self.update_duration();
            }
            SessionEvent::PlaybackStateChanged(_) => {}
        }
    }

    /// Consumes player callbacks until the channel closes.
    pub async fn run_event_loop(&self, receiver: Receiver<SessionEvent>) {
        while let Ok(event) = receiver.recv().await {
            self.handle_event(event);
        }
        debug!("Session event channel closed");
        self.stop_progress_updates();
    }

    fn update_duration(&self) {
        let duration = self.session.duration_ms().filter(|&d| d > 0).unwrap_or(0);
        self.app_state.update_duration(duration);
    }

    fn start_progress_updates(&self) {
        self.stop_progress_updates();

        let Ok(handle) = Handle::try_current() else {
            warn!("No async runtime, progress updates disabled");
            return;
        };

        let session = Arc::clone(&self.session);
        let app_state = Arc::clone(&self.app_state);
        let interval = self.progress_interval;
        let task = handle.spawn(async move {
            loop {
                let position = session.current_position_ms();
                let duration = session.duration_ms().unwrap_or(0);
                app_state.update_progress(position, progress_fraction(position, duration));
                sleep(interval).await;
            }
        });
        *self.progress_task.lock() = Some(task);
    }

    fn stop_progress_updates(&self) {
        if let Some(task) = self.progress_task.lock().take() {
            task.abort();
        }
    }

    /// Whether progress polling is running.
    pub fn is_tracking_progress(&self) -> bool {
        self.progress_task.lock().is_some()
    }

    /// Starts or resumes playback.
    pub fn play(&self) {
        self.session.play();
    }

    /// Pauses playback.
    pub fn pause(&self) {
        self.session.pause();
    }

    /// Pauses when playing, plays otherwise.
    pub fn toggle_play_pause(&self) {
        if self.app_state.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Seeks within the current song and publishes the position at once.
    pub fn seek_to(&self, position_ms: u64) {
        self.session.seek_to(position_ms);
        let duration = self.app_state.duration_ms();
        self.app_state
            .update_progress(position_ms, progress_fraction(position_ms, duration));
    }

    /// Seeks to a fraction of the current song's duration.
    pub fn seek_to_progress(&self, progress: f32) {
        let fraction = f64::from(progress.clamp(0.0, 1.0));
        let position = (fraction * self.app_state.duration_ms() as f64) as u64;
        self.seek_to(position);
    }

    /// Moves to the next song.
    pub fn skip_to_next(&self) {
        self.session.seek_to_next();
    }

    /// Restarts the current song when past the restart threshold, otherwise
    /// moves to the previous song.
    pub fn skip_to_previous(&self) {
        if self.app_state.position_ms() > self.restart_threshold_ms {
            self.seek_to(0);
        } else {
            self.session.seek_to_previous();
        }
    }

    /// Plays one song, replacing the queue.
    pub fn play_song(&self, song: Song) {
        self.play_queue(vec![song], 0);
    }

    /// Replaces the queue and plays it from `start_index`.
    ///
    /// An empty list clears the queue instead.
    pub fn play_queue(&self, songs: Vec<Song>, start_index: usize) {
        if songs.is_empty() {
            self.clear_queue();
            return;
        }

        let (items, start) = {
            let mut queue = self.queue.write();
            queue.set_queue(songs, start_index);
            (Self::media_items(&queue), queue.current_index())
        };
        self.load_generation.fetch_add(1, Ordering::AcqRel);
        self.session.set_media_items(items, start, 0);
        self.session.prepare();
        self.session.play();
        self.publish_queue();
    }

    /// Jumps to the song at `index` and plays it.
    pub fn play_at_index(&self, index: usize) {
        {
            let mut queue = self.queue.write();
            if index >= queue.len() {
                debug!("Ignoring play_at_index({}) for a queue of {}", index, queue.len());
                return;
            }
            queue.update_current_index(index);
        }
        self.load_generation.fetch_add(1, Ordering::AcqRel);
        self.session.seek_to_media_item(index, 0);
        self.session.play();
        self.publish_queue();
    }

    /// Appends a song to the queue.
    pub fn add_to_queue(&self, song: Song) {
        let item = MediaItem::from_song(&song);
        self.queue.write().add_to_queue(song);
        self.session.add_media_item(item);
        self.publish_queue();
    }

    /// Queues a song right after the current one.
    pub fn add_to_queue_next(&self, song: Song) {
        let item = MediaItem::from_song(&song);
        let index = self.queue.write().add_to_queue_next(song);
        self.session.insert_media_item(index, item);
        self.publish_queue();
    }

    /// Removes the song at `index`; out-of-range indices are ignored.
    pub fn remove_from_queue(&self, index: usize) {
        let removed = self.queue.write().remove_from_queue(index);
        if removed.is_some() {
            self.session.remove_media_item(index);
            self.publish_queue();
        }
    }

    /// Empties the queue.
    pub fn clear_queue(&self) {
        self.queue.write().clear_queue();
        self.session.clear_media_items();
        self.publish_queue();
    }

    /// Moves the song at `from` to `to`.
    pub fn reorder_queue(&self, from: usize, to: usize) {
        let moved = self.queue.write().reorder(from, to);
        if moved {
            self.session.move_media_item(from, to);
            self.publish_queue();
        }
    }

    /// Toggles shuffle and rebuilds the player's item list in the new order,
    /// keeping the current song and position.
    pub fn toggle_shuffle(&self) -> bool {
        let (enabled, rebuild) = {
            let mut queue = self.queue.write();
            let enabled = queue.toggle_shuffle();
            let rebuild =
                (!queue.is_empty()).then(|| (Self::media_items(&queue), queue.current_index()));
            (enabled, rebuild)
        };

        if let Some((items, index)) = rebuild {
            let position = self.session.current_position_ms();
            self.session.set_media_items(items, index, position);
        }
        self.publish_queue();
        enabled
    }

    /// Advances the repeat mode and forwards it to the player.
    pub fn cycle_repeat_mode(&self) -> RepeatMode {
        let mode = self.queue.write().cycle_repeat_mode();
        self.session.set_repeat_mode(mode);
        self.publish_queue();
        mode
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop_progress_updates();
    }
}
