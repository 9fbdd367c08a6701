//! M3U playlist import and export.
//!
//! Exported files are extended M3U: an `#EXTM3U` header, a `#PLAYLIST:`
//! line carrying the playlist name, then an `#EXTINF` line and the absolute
//! path for every song. Imports accept any M3U and match entries against
//! the library by exact file path.

use std::{
    collections::HashSet,
    fs::{File, create_dir_all},
    io::{self, BufRead, BufWriter, Write},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use {
    regex::Regex,
    serde::{Deserialize, Serialize},
    thiserror::Error,
    tracing::{debug, info, warn},
};

use crate::{error::domain::LibraryError, library::database::LibraryDatabase};

/// Name given to imported playlists without a `#PLAYLIST:` line.
pub const DEFAULT_IMPORT_NAME: &str = "Imported Playlist";

const HEADER: &str = "#EXTM3U";
const PLAYLIST_PREFIX: &str = "#PLAYLIST:";
const EXTINF_PREFIX: &str = "#EXTINF:";

static UNSAFE_FILE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9._-]").expect("file name pattern is valid"));

/// Error type for playlist file operations.
#[derive(Error, Debug)]
pub enum PlaylistFileError {
    /// Reading or writing the playlist file failed.
    #[error("Playlist file I/O error: {0}")]
    Io(#[from] io::Error),
    /// The imported file lists no tracks.
    #[error("No tracks found in playlist file")]
    NoTracks,
    /// A library query failed.
    #[error(transparent)]
    Library(#[from] LibraryError),
}

/// Outcome of exporting every playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportAllResult {
    /// Playlists written.
    pub success_count: usize,
    /// Playlists that could not be written.
    pub failure_count: usize,
    /// Names of the playlists that could not be written.
    pub failed_playlists: Vec<String>,
    /// Files written, in playlist order.
    pub written_files: Vec<PathBuf>,
}

/// Outcome of importing one playlist file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    /// Id of the created playlist.
    pub playlist_id: i64,
    /// Name of the created playlist.
    pub playlist_name: String,
    /// Track entries in the file.
    pub total_tracks: usize,
    /// Entries found in the library.
    pub matched_tracks: usize,
    /// Entries not found in the library.
    pub unmatched_paths: Vec<String>,
}

impl ImportResult {
    /// Number of entries not found in the library.
    #[must_use]
    pub fn unmatched_count(&self) -> usize {
        self.unmatched_paths.len()
    }

    /// Fraction of entries found in the library, 0 for an empty file.
    #[must_use]
    pub fn success_rate(&self) -> f32 {
        if self.total_tracks == 0 {
            0.0
        } else {
            self.matched_tracks as f32 / self.total_tracks as f32
        }
    }
}

/// Replaces every character outside `[a-zA-Z0-9._-]` with `_`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    UNSAFE_FILE_NAME_CHARS.replace_all(name, "_").into_owned()
}

/// Writes one playlist as extended M3U.
///
/// # Errors
///
/// Returns `PlaylistFileError::Library` with `NotFound` for an unknown
/// playlist, or an I/O error from the writer.
pub async fn export_playlist<W: Write>(
    database: &LibraryDatabase,
    playlist_id: i64,
    writer: &mut W,
) -> Result<(), PlaylistFileError> {
    let playlist = database
        .get_playlist_with_songs(playlist_id)
        .await?
        .ok_or_else(|| LibraryError::NotFound {
            entity: "playlist".to_string(),
            id: playlist_id,
        })?;

    writeln!(writer, "{HEADER}")?;
    writeln!(writer, "{PLAYLIST_PREFIX}{}", playlist.playlist.name)?;
    for song in &playlist.songs {
        let seconds = song.duration_ms / 1000;
        let display_name = match song.artist.as_deref().filter(|a| !a.is_empty()) {
            Some(artist) => format!("{artist} - {}", song.display_title()),
            None => song.display_title().to_string(),
        };
        writeln!(writer, "{EXTINF_PREFIX}{seconds},{display_name}")?;
        writeln!(writer, "{}", song.file_path)?;
    }
    writer.flush()?;

    debug!(
        "Exported playlist {} with {} songs",
        playlist_id,
        playlist.songs.len()
    );
    Ok(())
}

/// Writes every playlist into `directory`, one `<name>.m3u` per playlist.
///
/// File names are sanitized; when two playlists sanitize to the same name
/// the later one gets its id appended. A playlist that fails to export is
/// counted and skipped.
///
/// # Errors
///
/// Returns `PlaylistFileError` if the directory cannot be created or the
/// playlists cannot be listed.
pub async fn export_all_playlists(
    database: &LibraryDatabase,
    directory: &Path,
) -> Result<ExportAllResult, PlaylistFileError> {
    create_dir_all(directory)?;
    let playlists = database.get_all_playlists().await?;

    let mut result = ExportAllResult::default();
    let mut used_names = HashSet::new();

    for playlist in playlists {
        let mut stem = sanitize_file_name(&playlist.name);
        if !used_names.insert(stem.clone()) {
            stem = format!("{stem}_{}", playlist.id);
            used_names.insert(stem.clone());
        }
        let path = directory.join(format!("{stem}.m3u"));

        match write_playlist_file(database, playlist.id, &path).await {
            Ok(()) => {
                result.success_count += 1;
                result.written_files.push(path);
            }
            Err(e) => {
                warn!("Failed to export playlist \"{}\": {}", playlist.name, e);
                result.failure_count += 1;
                result.failed_playlists.push(playlist.name);
            }
        }
    }

    info!(
        "Exported {} playlists ({} failed) to {:?}",
        result.success_count, result.failure_count, directory
    );
    Ok(result)
}

async fn write_playlist_file(
    database: &LibraryDatabase,
    playlist_id: i64,
    path: &Path,
) -> Result<(), PlaylistFileError> {
    let mut writer = BufWriter::new(File::create(path)?);
    export_playlist(database, playlist_id, &mut writer).await
}

/// Parsed content of an M3U file.
#[derive(Debug, Clone, PartialEq)]
struct ParsedPlaylist {
    name: String,
    paths: Vec<String>,
}

fn parse_playlist<R: BufRead>(reader: R) -> Result<ParsedPlaylist, PlaylistFileError> {
    let mut name = DEFAULT_IMPORT_NAME.to_string();
    let mut paths = Vec::new();

    // Paths are bytes on disk; undecodable bytes become U+FFFD like the
    // scanner's stored paths.
    for raw in reader.split(b'\n') {
        let raw = raw?;
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();
        if let Some(declared) = line.strip_prefix(PLAYLIST_PREFIX) {
            let declared = declared.trim();
            if !declared.is_empty() {
                name = declared.to_string();
            }
        } else if !line.is_empty() && !line.starts_with('#') {
            paths.push(line.to_string());
        }
    }

    if paths.is_empty() {
        return Err(PlaylistFileError::NoTracks);
    }
    Ok(ParsedPlaylist { name, paths })
}

/// Creates a playlist from an M3U file.
///
/// Entries are matched against the library by exact file path; unmatched
/// entries are reported, not added.
///
/// # Errors
///
/// Returns `PlaylistFileError::NoTracks` for a file without entries, or an
/// I/O or library error.
pub async fn import_playlist<R: BufRead>(
    database: &LibraryDatabase,
    reader: R,
) -> Result<ImportResult, PlaylistFileError> {
    let parsed = parse_playlist(reader)?;

    let playlist_id = database.create_playlist(&parsed.name, None).await?;

    let mut matched_ids = Vec::new();
    let mut unmatched_paths = Vec::new();
    for path in &parsed.paths {
        match database.get_song_by_file_path(path).await? {
            Some(song) => matched_ids.push(song.id),
            None => unmatched_paths.push(path.clone()),
        }
    }

    if !matched_ids.is_empty() {
        database
            .add_songs_to_playlist(playlist_id, &matched_ids)
            .await?;
    }

    info!(
        "Imported playlist \"{}\": {}/{} tracks matched",
        parsed.name,
        matched_ids.len(),
        parsed.paths.len()
    );
    Ok(ImportResult {
        playlist_id,
        playlist_name: parsed.name,
        total_tracks: parsed.paths.len(),
        matched_tracks: matched_ids.len(),
        unmatched_paths,
    })
}
