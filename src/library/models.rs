//! Data models for the music library database.
//!
//! Songs, playlists, scan folders and equalizer presets map one-to-one onto
//! their tables. `FileItem` describes entries of the folder browser and is
//! never stored.

use std::path::Path;

use {
    serde::{Deserialize, Serialize},
    sqlx::FromRow,
};

/// Fallback artist label for untagged songs.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Represents an audio file known to the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Default)]
pub struct Song {
    /// Unique database ID.
    pub id: i64,
    /// Absolute path of the audio file.
    pub file_path: String,
    /// File name including extension.
    pub file_name: String,
    /// Track title from tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Track artist from tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Album name from tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: i64,
    /// File size in bytes.
    pub file_size: i64,
    /// Unix timestamp in milliseconds when the song was first scanned.
    pub date_added: i64,
    /// Unix timestamp in milliseconds of the last play.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_played: Option<i64>,
    /// Number of times the song became the current queue item.
    pub play_count: i64,
    /// Track number within the album.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<i64>,
    /// Release year.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,
    /// Genre.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
}

impl Song {
    /// Title for display, falling back to the file name.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.file_name)
    }

    /// Artist for display, falling back to a placeholder.
    #[must_use]
    pub fn display_artist(&self) -> &str {
        self.artist.as_deref().unwrap_or(UNKNOWN_ARTIST)
    }

    /// Duration formatted as `m:ss`.
    #[must_use]
    pub fn formatted_duration(&self) -> String {
        format_minutes_seconds(self.duration_ms)
    }
}

/// A user playlist with aggregate information about its songs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Default)]
pub struct Playlist {
    /// Unique database ID.
    pub id: i64,
    /// Playlist name.
    pub name: String,
    /// Optional free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unix timestamp in milliseconds of creation.
    pub created_at: i64,
    /// Unix timestamp in milliseconds of the last edit.
    pub updated_at: i64,
    /// Unix timestamp in milliseconds of the last time it was played.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_played: Option<i64>,
    /// Number of songs in the playlist.
    #[sqlx(default)]
    pub song_count: i64,
    /// Sum of the song durations in milliseconds.
    #[sqlx(default)]
    pub total_duration_ms: i64,
}

impl Playlist {
    /// Total duration formatted as `"{h}h {m}m"` or `"{m}m"`.
    #[must_use]
    pub fn formatted_duration(&self) -> String {
        let total_minutes = self.total_duration_ms.max(0) / 60_000;
        let hours = total_minutes / 60;
        let minutes = total_minutes % 60;
        if hours > 0 {
            format!("{hours}h {minutes}m")
        } else {
            format!("{minutes}m")
        }
    }
}

/// A playlist together with its songs in playlist order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistWithSongs {
    /// The playlist record.
    pub playlist: Playlist,
    /// Songs ordered by position.
    pub songs: Vec<Song>,
}

/// A directory the scanner walks for audio files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ScanFolder {
    /// Unique database ID.
    pub id: i64,
    /// Absolute directory path.
    pub path: String,
    /// Whether the folder takes part in full scans.
    pub enabled: bool,
    /// Unix timestamp in milliseconds of the last completed scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scanned: Option<i64>,
}

impl ScanFolder {
    /// Last path component, or the full path for roots.
    #[must_use]
    pub fn display_name(&self) -> &str {
        Path::new(&self.path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.path)
    }
}

/// A stored equalizer configuration.
///
/// Band levels are millibels; bass boost and virtualizer are device
/// strengths in `0..=1000`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, Default)]
pub struct EqPreset {
    /// Unique database ID.
    pub id: i64,
    /// Preset name, unique for display purposes.
    pub name: String,
    /// Whether the user created this preset.
    pub is_custom: bool,
    /// 60 Hz band level.
    pub band_60hz: i32,
    /// 250 Hz band level.
    pub band_250hz: i32,
    /// 1 kHz band level.
    pub band_1khz: i32,
    /// 4 kHz band level.
    pub band_4khz: i32,
    /// 16 kHz band level.
    pub band_16khz: i32,
    /// Bass boost strength.
    pub bass_boost: i32,
    /// Virtualizer strength.
    pub virtualizer: i32,
    /// Unix timestamp in milliseconds of creation.
    pub created_at: i64,
}

impl EqPreset {
    /// Name of the neutral built-in preset.
    pub const FLAT_NAME: &'static str = "Flat";

    /// An unsaved neutral preset.
    #[must_use]
    pub fn flat() -> Self {
        Self {
            name: Self::FLAT_NAME.to_string(),
            ..Self::default()
        }
    }

    /// Band levels ordered from lowest to highest frequency.
    #[must_use]
    pub fn bands(&self) -> [i32; 5] {
        [
            self.band_60hz,
            self.band_250hz,
            self.band_1khz,
            self.band_4khz,
            self.band_16khz,
        ]
    }
}

/// Ordering options for song listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SongSortOrder {
    /// Title, case-insensitive.
    #[default]
    Title,
    /// Artist, then album, then track number.
    Artist,
    /// Newest first.
    DateAdded,
    /// Shortest first.
    Duration,
    /// File name, case-insensitive.
    FileName,
}

impl SongSortOrder {
    /// SQL `ORDER BY` clause for this ordering.
    #[must_use]
    pub fn order_by_clause(self) -> &'static str {
        match self {
            Self::Title => "COALESCE(title, file_name) COLLATE NOCASE ASC",
            Self::Artist => "artist COLLATE NOCASE ASC, album COLLATE NOCASE ASC, track_number ASC",
            Self::DateAdded => "date_added DESC",
            Self::Duration => "duration_ms ASC",
            Self::FileName => "file_name COLLATE NOCASE ASC",
        }
    }
}

/// An entry of the folder browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileItem {
    /// Absolute path.
    pub path: String,
    /// File or directory name.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// Size in bytes, zero for directories.
    pub size: u64,
    /// Duration from tags, when readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Artist from tags, when readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Title from tags, when readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl FileItem {
    /// Name with a trailing slash for directories.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.is_directory {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        }
    }

    /// Duration formatted as `m:ss`, if known.
    #[must_use]
    pub fn formatted_duration(&self) -> Option<String> {
        self.duration_ms.map(format_minutes_seconds)
    }
}

/// Formats milliseconds as `m:ss`.
#[must_use]
pub fn format_minutes_seconds(duration_ms: i64) -> String {
    let total_seconds = duration_ms.max(0) / 1000;
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}
