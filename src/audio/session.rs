//! Interface to the host media player.
//!
//! The host owns decoding, output and the audio session. The crate drives it
//! through [`MediaSession`] and learns about its state changes from
//! [`SessionEvent`]s delivered over a channel.

use serde::{Deserialize, Serialize};

use crate::{audio::queue::RepeatMode, library::models::Song};

/// A playable item as handed to the host player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Library song id, as text.
    pub media_id: String,
    /// Location of the audio file.
    pub uri: String,
    /// Title shown by the host.
    pub title: String,
    /// Artist shown by the host.
    pub artist: Option<String>,
    /// Album shown by the host.
    pub album: Option<String>,
}

impl MediaItem {
    /// Builds the item for a library song.
    #[must_use]
    pub fn from_song(song: &Song) -> Self {
        Self {
            media_id: song.id.to_string(),
            uri: song.file_path.clone(),
            title: song.display_title().to_string(),
            artist: song.artist.clone(),
            album: song.album.clone(),
        }
    }
}

/// Coarse player state reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerState {
    /// Nothing loaded.
    Idle,
    /// Loading data.
    Buffering,
    /// Able to play immediately.
    Ready,
    /// Reached the end of the item list.
    Ended,
}

/// Why another item became current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionReason {
    /// The previous item finished.
    Auto,
    /// The same item started over because of the repeat mode.
    Repeat,
    /// A seek to another item was requested.
    Seek,
    /// The item list was replaced or rebuilt.
    PlaylistChanged,
}

/// Player callbacks, delivered in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Playback started or stopped.
    IsPlayingChanged(bool),
    /// Another item became current.
    MediaItemTransition {
        /// Media id of the new current item.
        media_id: Option<String>,
        /// What caused the transition.
        reason: TransitionReason,
    },
    /// The player state changed.
    PlaybackStateChanged(PlayerState),
}

/// Host media player.
///
/// Indices refer to the host's item list, which the playback controller
/// keeps in the same order as the queue. Calls do not fail: like the host
/// APIs they model, invalid requests are ignored by the host.
pub trait MediaSession: Send + Sync {
    /// Replaces the item list and moves to `start_index` at `start_position_ms`.
    fn set_media_items(&self, items: Vec<MediaItem>, start_index: usize, start_position_ms: u64);

    /// Appends an item.
    fn add_media_item(&self, item: MediaItem);

    /// Inserts an item at `index`.
    fn insert_media_item(&self, index: usize, item: MediaItem);

    /// Removes the item at `index`.
    fn remove_media_item(&self, index: usize);

    /// Moves the item at `from` to `to`.
    fn move_media_item(&self, from: usize, to: usize);

    /// Removes every item.
    fn clear_media_items(&self);

    /// Starts loading the current item.
    fn prepare(&self);

    /// Starts or resumes playback.
    fn play(&self);

    /// Pauses playback.
    fn pause(&self);

    /// Seeks within the current item.
    fn seek_to(&self, position_ms: u64);

    /// Makes `index` current and seeks within it.
    fn seek_to_media_item(&self, index: usize, position_ms: u64);

    /// Moves to the next item, honouring the repeat mode.
    fn seek_to_next(&self);

    /// Moves to the previous item.
    fn seek_to_previous(&self);

    /// Sets the repeat mode.
    fn set_repeat_mode(&self, mode: RepeatMode);

    /// Whether audio is playing.
    fn is_playing(&self) -> bool;

    /// Index of the current item.
    fn current_media_item_index(&self) -> usize;

    /// Position within the current item.
    fn current_position_ms(&self) -> u64;

    /// Duration of the current item, if known.
    fn duration_ms(&self) -> Option<u64>;

    /// Identifier of the audio session effects attach to; 0 when there is none.
    fn audio_session_id(&self) -> i32;
}

#[cfg(test)]
mod tests {
    use crate::{audio::session::MediaItem, library::models::Song};

    #[test]
    fn test_media_item_from_song() {
        let song = Song {
            id: 7,
            file_path: "/music/a.flac".to_string(),
            file_name: "a.flac".to_string(),
            artist: Some("Band".to_string()),
            ..Song::default()
        };

        let item = MediaItem::from_song(&song);
        assert_eq!(item.media_id, "7");
        assert_eq!(item.uri, "/music/a.flac");
        assert_eq!(item.title, "a.flac");
        assert_eq!(item.artist.as_deref(), Some("Band"));
        assert_eq!(item.album, None);
    }
}
