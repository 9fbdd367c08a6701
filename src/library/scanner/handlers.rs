//! File system event handlers for the library scanner.

use std::{
    fs::metadata,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    audio::metadata::TagReader,
    error::domain::LibraryError,
    library::{database::LibraryDatabase, file_watcher::ChangeBatch, models::Song},
};

/// Builds the library record for an audio file.
///
/// Unreadable tags are not an error: the song is then known by its file
/// name only.
pub fn build_song(path: &Path) -> Song {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_size = metadata(path)
        .map(|m| i64::try_from(m.len()).unwrap_or(i64::MAX))
        .unwrap_or(0);

    let mut song = Song {
        file_path: path.to_string_lossy().into_owned(),
        file_name,
        file_size,
        ..Song::default()
    };

    match TagReader::read(path) {
        Ok(tags) => {
            song.title = tags.title;
            song.artist = tags.artist;
            song.album = tags.album;
            song.duration_ms = i64::try_from(tags.duration_ms).unwrap_or(i64::MAX);
            song.track_number = tags.track_number.map(i64::from);
            song.year = tags.year.map(i64::from);
            song.genre = tags.genre;
        }
        Err(e) => debug!("No tags for {:?}: {}", path, e),
    }

    song
}

/// Handles files that were created or modified.
///
/// New files are added; known files get their tags refreshed.
///
/// # Returns
///
/// The number of songs that were not in the library before.
///
/// # Errors
///
/// Returns `LibraryError` if a database statement fails.
pub async fn handle_files_changed(
    paths: Vec<PathBuf>,
    database: &LibraryDatabase,
) -> Result<usize, LibraryError> {
    let mut added = 0;
    for path in paths {
        if !path.is_file() {
            debug!("Skipping vanished file {:?}", path);
            continue;
        }
        let song = build_song(&path);
        let is_new = !database.song_exists(&song.file_path).await?;
        database.insert_song(&song).await?;
        if is_new {
            added += 1;
        }
    }
    Ok(added)
}

/// Handles files (or whole directories) that were removed.
///
/// # Returns
///
/// The number of songs deleted from the library.
///
/// # Errors
///
/// Returns `LibraryError` if a database statement fails.
pub async fn handle_files_removed(
    paths: Vec<PathBuf>,
    database: &LibraryDatabase,
) -> Result<u64, LibraryError> {
    let mut deleted = 0;
    for path in paths {
        let path_str = path.to_string_lossy();
        let count = database.delete_songs_at_or_below(&path_str).await?;
        debug!("Deleted {} songs for path {}", count, path_str);
        deleted += count;
    }
    Ok(deleted)
}

/// Handles files that were renamed or moved.
///
/// The stored song follows the file so its statistics and playlist entries
/// survive; files the library did not know yet are added.
///
/// # Errors
///
/// Returns `LibraryError` if a database statement fails.
pub async fn handle_files_renamed(
    paths: Vec<(PathBuf, PathBuf)>,
    database: &LibraryDatabase,
) -> Result<(), LibraryError> {
    let mut unknown = Vec::new();
    for (from, to) in paths {
        let file_name = to
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let moved = database
            .move_song(&from.to_string_lossy(), &to.to_string_lossy(), &file_name)
            .await?;
        if !moved {
            warn!("Rename of unknown song {:?}, adding {:?}", from, to);
            database.delete_song_by_file_path(&from.to_string_lossy()).await?;
            unknown.push(to);
        }
    }

    if !unknown.is_empty() {
        handle_files_changed(unknown, database).await?;
    }
    Ok(())
}

/// Applies one debounced batch: removals, then moves, then changes.
///
/// # Errors
///
/// Returns `LibraryError` if a database statement fails.
pub async fn apply_change_batch(
    batch: ChangeBatch,
    database: &LibraryDatabase,
) -> Result<(), LibraryError> {
    let ChangeBatch {
        changed,
        removed,
        renamed,
    } = batch;
    debug!(
        "Applying {} changed, {} removed, {} renamed files",
        changed.len(),
        removed.len(),
        renamed.len()
    );

    if !removed.is_empty() {
        handle_files_removed(removed, database).await?;
    }
    if !renamed.is_empty() {
        handle_files_renamed(renamed, database).await?;
    }
    if !changed.is_empty() {
        handle_files_changed(changed, database).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::{create_dir, rename, write};

    use tempfile::tempdir;

    use crate::library::{
        database::LibraryDatabase,
        file_watcher::ChangeBatch,
        scanner::handlers::{
            apply_change_batch, build_song, handle_files_changed, handle_files_removed,
            handle_files_renamed,
        },
    };

    #[test]
    fn test_build_song_without_tags() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Track 01.mp3");
        write(&path, vec![0u8; 64]).unwrap();

        let song = build_song(&path);
        assert_eq!(song.file_name, "Track 01.mp3");
        assert_eq!(song.file_size, 64);
        assert_eq!(song.title, None);
        assert_eq!(song.display_title(), "Track 01.mp3");
        assert_eq!(song.file_path, path.to_string_lossy());
    }

    #[tokio::test]
    async fn test_changed_removed_renamed() {
        let dir = tempdir().unwrap();
        let database = LibraryDatabase::open_in_memory().await.unwrap();
        let album = dir.path().join("album");
        create_dir(&album).unwrap();
        let a = album.join("a.mp3");
        let b = album.join("b.mp3");
        write(&a, b"a").unwrap();
        write(&b, b"b").unwrap();

        let added = handle_files_changed(vec![a.clone(), b.clone()], &database)
            .await
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(
            handle_files_changed(vec![a.clone()], &database).await.unwrap(),
            0
        );

        let stored = database
            .get_song_by_file_path(&a.to_string_lossy())
            .await
            .unwrap()
            .unwrap();
        database.increment_play_count(stored.id).await.unwrap();

        let renamed = dir.path().join("renamed.mp3");
        rename(&a, &renamed).unwrap();
        handle_files_renamed(vec![(a.clone(), renamed.clone())], &database)
            .await
            .unwrap();
        let moved = database.get_song_by_id(stored.id).await.unwrap().unwrap();
        assert_eq!(moved.file_path, renamed.to_string_lossy());
        assert_eq!(moved.file_name, "renamed.mp3");
        assert_eq!(moved.play_count, 1);

        let deleted = handle_files_removed(vec![album.clone()], &database)
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(database.get_song_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_applies_removals_before_changes() {
        let dir = tempdir().unwrap();
        let database = LibraryDatabase::open_in_memory().await.unwrap();
        let old = dir.path().join("old.ogg");
        let new = dir.path().join("new.ogg");
        write(&old, b"old").unwrap();
        handle_files_changed(vec![old.clone()], &database).await.unwrap();
        write(&new, b"new").unwrap();

        apply_change_batch(
            ChangeBatch {
                changed: vec![new.clone()],
                removed: vec![old.clone()],
                renamed: Vec::new(),
            },
            &database,
        )
        .await
        .unwrap();

        assert!(!database.song_exists(&old.to_string_lossy()).await.unwrap());
        assert!(database.song_exists(&new.to_string_lossy()).await.unwrap());
        assert!(apply_change_batch(ChangeBatch::default(), &database).await.is_ok());
    }
}
