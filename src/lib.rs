//! Tapedeck - local music library and playback core
//!
//! An offline music player core: a SQLite library fed by a folder scanner
//! and file watcher, M3U playlist import and export, a playback queue with
//! shuffle and repeat kept in step with a host media player, and a five
//! band equalizer with bass boost, virtualizer and stored presets.

pub mod audio;
pub mod config;
pub mod error;
pub mod library;
pub mod state;

// Re-export key types for convenience
pub use {
    audio::{
        controller::PlaybackController,
        eq_controller::{EqualizerController, EqualizerView},
        equalizer::{EqualizerManager, EqualizerState},
        queue::{QueueManager, QueueSnapshot, RepeatMode},
        service::PlaybackService,
        session::{MediaItem, MediaSession, PlayerState, SessionEvent},
    },
    config::{SettingsManager, UserSettings},
    error::{EffectError, LibraryError, PlaybackError, PresetError},
    library::{EqPreset, LibraryDatabase, LibraryScanner, Playlist, Song},
    state::{AppState, AppStateEvent, PlaybackSnapshot},
};
