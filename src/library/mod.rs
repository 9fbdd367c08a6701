//! Music library management.
//!
//! The SQLite-backed library of songs, playlists, scan folders and
//! equalizer presets, plus the scanner, file watcher, folder browser and
//! M3U support that feed it.

pub mod browser;
pub mod database;
pub mod file_watcher;
pub mod m3u;
pub mod models;
pub mod playlists;
pub mod presets;
pub mod scan_folders;
pub mod scanner;
pub mod schema;
pub mod songs;

pub use {
    database::LibraryDatabase,
    models::{EqPreset, FileItem, Playlist, PlaylistWithSongs, ScanFolder, Song, SongSortOrder},
    scanner::{LibraryScanner, ScanProgress, ScanResult, ScannerEvent},
    schema::{CURRENT_SCHEMA_VERSION, SchemaManager, create_connection_pool},
};
