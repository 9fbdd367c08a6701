//! Playback service wiring a host session to the library and effects.

use std::sync::Arc;

use {
    async_channel::Receiver,
    parking_lot::Mutex,
    rand::{seq::SliceRandom, thread_rng},
    tracing::{debug, error, info},
};

use crate::{
    audio::{
        controller::PlaybackController,
        equalizer::EqualizerManager,
        session::{MediaSession, SessionEvent, TransitionReason},
    },
    config::UserSettings,
    error::domain::PlaybackError,
    library::database::LibraryDatabase,
    state::AppState,
};

/// Runs one host session: queue control, play counting and effects.
pub struct PlaybackService {
    session: Arc<dyn MediaSession>,
    controller: PlaybackController,
    equalizer: Arc<EqualizerManager>,
    database: Arc<LibraryDatabase>,
    /// Load generation and media id of the last counted play.
    last_counted: Mutex<Option<(u64, String)>>,
}

impl PlaybackService {
    /// Creates the service and attaches the equalizer to the session's
    /// audio session.
    pub fn new(
        session: Arc<dyn MediaSession>,
        database: Arc<LibraryDatabase>,
        equalizer: Arc<EqualizerManager>,
        app_state: Arc<AppState>,
        settings: &UserSettings,
    ) -> Self {
        let controller = PlaybackController::new(Arc::clone(&session), app_state, settings);

        let audio_session_id = session.audio_session_id();
        if audio_session_id != 0 {
            equalizer.attach_to_audio_session(audio_session_id);
        } else {
            debug!("Session has no audio session id, effects stay detached");
        }

        Self {
            session,
            controller,
            equalizer,
            database,
            last_counted: Mutex::new(None),
        }
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn equalizer(&self) -> &Arc<EqualizerManager> {
        &self.equalizer
    }

    /// Applies one player callback and records plays.
    ///
    /// A play is counted each time an item becomes current, including
    /// repeats and songs started again with `play_*`. Further transition
    /// callbacks for the item already counted in the same load, such as the
    /// list rebuild after a shuffle toggle, are ignored.
    pub async fn handle_event(&self, event: SessionEvent) {
        if let SessionEvent::MediaItemTransition {
            media_id: Some(media_id),
            reason,
        } = &event
        {
            self.record_play(media_id, *reason).await;
        }
        self.controller.handle_event(event);
    }

    async fn record_play(&self, media_id: &str, reason: TransitionReason) {
        let generation = self.controller.load_generation();
        {
            let mut last_counted = self.last_counted.lock();
            let already_counted = last_counted
                .as_ref()
                .is_some_and(|(counted_in, id)| *counted_in == generation && id == media_id);
            if already_counted && reason != TransitionReason::Repeat {
                return;
            }
            *last_counted = Some((generation, media_id.to_string()));
        }

        let Ok(song_id) = media_id.parse::<i64>() else {
            debug!("Ignoring play of non-library item {}", media_id);
            return;
        };
        if let Err(e) = self.database.increment_play_count(song_id).await {
            error!("Failed to record play of song {}: {}", song_id, e);
        }
    }

    /// Consumes player callbacks until the channel closes.
    pub async fn run(&self, receiver: Receiver<SessionEvent>) {
        while let Ok(event) = receiver.recv().await {
            self.handle_event(event).await;
        }
        debug!("Playback service event loop finished");
    }

    /// Plays a playlist from `start_index`, or in random order.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::EmptyQueue` for an empty playlist, or a
    /// library error if the playlist cannot be read.
    pub async fn play_playlist(
        &self,
        playlist_id: i64,
        start_index: usize,
        shuffled: bool,
    ) -> Result<(), PlaybackError> {
        let mut songs = self.database.get_songs_for_playlist(playlist_id).await?;
        if songs.is_empty() {
            return Err(PlaybackError::EmptyQueue);
        }

        let start_index = if shuffled {
            songs.shuffle(&mut thread_rng());
            0
        } else {
            start_index
        };

        self.controller.play_queue(songs, start_index);
        self.database.update_last_played(playlist_id).await?;
        Ok(())
    }

    /// Saves the queue, in play order, as a new playlist.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::EmptyQueue` for an empty queue, or a library
    /// error if the playlist cannot be stored.
    pub async fn save_queue_as_playlist(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<i64, PlaybackError> {
        let song_ids: Vec<i64> = self
            .controller
            .queue()
            .songs
            .iter()
            .map(|song| song.id)
            .collect();
        if song_ids.is_empty() {
            return Err(PlaybackError::EmptyQueue);
        }

        let id = self
            .database
            .save_songs_as_playlist(name, description, &song_ids)
            .await?;
        info!("Saved queue of {} songs as playlist {}", song_ids.len(), id);
        Ok(id)
    }

    /// Pauses playback and releases the audio effects.
    pub fn shutdown(&self) {
        self.session.pause();
        self.equalizer.release();
    }
}
