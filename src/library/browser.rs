//! Folder browsing outside of the scanned library.
//!
//! Lists directories and audio files so a host can navigate the file system
//! and play files directly. Played files are added to the library on the
//! fly.

use std::{
    cmp::Ordering,
    fs::read_dir,
    io,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    audio::metadata::TagReader,
    error::domain::LibraryError,
    library::{
        database::LibraryDatabase,
        file_watcher::is_supported_audio_file,
        models::{FileItem, Song},
    },
};

/// Lists the directories and supported audio files directly inside `path`.
///
/// Directories come first, then files, each ordered case-insensitively by
/// name. Entries whose name starts with a dot are skipped unless
/// `show_hidden` is set. A path that is not a directory yields an empty
/// listing.
///
/// # Errors
///
/// Returns an I/O error if the directory exists but cannot be read.
pub fn list_directory(path: &Path, show_hidden: bool) -> io::Result<Vec<FileItem>> {
    if !path.is_dir() {
        return Ok(Vec::new());
    }

    let mut items = Vec::new();
    for entry in read_dir(path)?.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !show_hidden && name.starts_with('.') {
            continue;
        }

        let entry_path = entry.path();
        if entry_path.is_dir() {
            items.push(FileItem {
                path: entry_path.to_string_lossy().into_owned(),
                name,
                is_directory: true,
                size: 0,
                duration_ms: None,
                artist: None,
                title: None,
            });
        } else if is_supported_audio_file(&entry_path) {
            items.push(audio_file_item(&entry_path, name));
        }
    }

    items.sort_by(compare_items);
    Ok(items)
}

fn compare_items(a: &FileItem, b: &FileItem) -> Ordering {
    b.is_directory
        .cmp(&a.is_directory)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}

fn audio_file_item(path: &Path, name: String) -> FileItem {
    let size = path.metadata().map(|m| m.len()).unwrap_or(0);
    let mut item = FileItem {
        path: path.to_string_lossy().into_owned(),
        name,
        is_directory: false,
        size,
        duration_ms: None,
        artist: None,
        title: None,
    };

    match TagReader::read(path) {
        Ok(tags) => {
            item.duration_ms = i64::try_from(tags.duration_ms).ok();
            item.artist = tags.artist;
            item.title = tags.title;
        }
        Err(e) => debug!("No tags for {:?}: {}", path, e),
    }
    item
}

/// Parent of `path`, or `None` at the file system root.
#[must_use]
pub fn parent_directory(path: &Path) -> Option<PathBuf> {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// Returns the library song for a browsed file, adding it when unknown.
///
/// # Errors
///
/// Returns `LibraryError` for a directory item or a failed statement.
pub async fn get_or_create_song(
    database: &LibraryDatabase,
    item: &FileItem,
) -> Result<Song, LibraryError> {
    if item.is_directory {
        return Err(LibraryError::InvalidData {
            reason: format!("{} is a directory", item.path),
        });
    }
    if let Some(song) = database.get_song_by_file_path(&item.path).await? {
        return Ok(song);
    }

    let mut song = Song {
        file_path: item.path.clone(),
        file_name: item.name.clone(),
        title: item.title.clone(),
        artist: item.artist.clone(),
        duration_ms: item.duration_ms.unwrap_or(0),
        file_size: i64::try_from(item.size).unwrap_or(i64::MAX),
        ..Song::default()
    };
    song.id = database.insert_song(&song).await?;
    Ok(song)
}

/// Resolves the audio files of a listing into a play queue.
///
/// # Returns
///
/// The songs in listing order and the index of `selected` among them
/// (0 when it is not part of the listing).
///
/// # Errors
///
/// Returns `LibraryError` if a statement fails.
pub async fn queue_from_listing(
    database: &LibraryDatabase,
    items: &[FileItem],
    selected: &FileItem,
) -> Result<(Vec<Song>, usize), LibraryError> {
    let mut songs = Vec::new();
    for item in items.iter().filter(|item| !item.is_directory) {
        songs.push(get_or_create_song(database, item).await?);
    }
    let start = songs
        .iter()
        .position(|song| song.file_path == selected.path)
        .unwrap_or(0);
    Ok((songs, start))
}
