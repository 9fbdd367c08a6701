//! Song queries.

use {
    sqlx::{SqliteConnection, query, query_as, query_scalar},
    tracing::debug,
};

use crate::{
    error::domain::LibraryError,
    library::{
        database::{LibraryDatabase, now_millis},
        models::{Song, SongSortOrder},
    },
};

/// Number of songs returned by the most-played listing.
const MOST_PLAYED_LIMIT: i64 = 50;

const UPSERT_SONG: &str = r#"
    INSERT INTO songs (
        file_path, file_name, title, artist, album, duration_ms, file_size,
        date_added, last_played, play_count, track_number, year, genre
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (file_path) DO UPDATE SET
        file_name = excluded.file_name,
        title = excluded.title,
        artist = excluded.artist,
        album = excluded.album,
        duration_ms = excluded.duration_ms,
        file_size = excluded.file_size,
        track_number = excluded.track_number,
        year = excluded.year,
        genre = excluded.genre
    RETURNING id
"#;

fn escape_like(text: &str, pattern: &mut String) {
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
}

/// Builds a `LIKE` pattern matching `needle` anywhere, escaping wildcards.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    escape_like(needle, &mut pattern);
    pattern.push('%');
    pattern
}

/// Builds a `LIKE` pattern matching every path below `directory`.
fn below_directory_pattern(directory: &str) -> String {
    let directory = directory.trim_end_matches('/');
    let mut pattern = String::with_capacity(directory.len() + 2);
    escape_like(directory, &mut pattern);
    pattern.push_str("/%");
    pattern
}

/// Inserts or refreshes one song on an open connection.
///
/// An existing row with the same path keeps its id, play statistics and
/// playlist memberships.
async fn upsert_song(conn: &mut SqliteConnection, song: &Song) -> Result<i64, LibraryError> {
    let date_added = if song.date_added > 0 {
        song.date_added
    } else {
        now_millis()
    };

    let id = query_scalar(UPSERT_SONG)
        .bind(&song.file_path)
        .bind(&song.file_name)
        .bind(&song.title)
        .bind(&song.artist)
        .bind(&song.album)
        .bind(song.duration_ms)
        .bind(song.file_size)
        .bind(date_added)
        .bind(song.last_played)
        .bind(song.play_count)
        .bind(song.track_number)
        .bind(song.year)
        .bind(&song.genre)
        .fetch_one(conn)
        .await?;
    Ok(id)
}

impl LibraryDatabase {
    /// Lists every song in the requested order.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_all_songs(&self, order: SongSortOrder) -> Result<Vec<Song>, LibraryError> {
        let sql = format!("SELECT * FROM songs ORDER BY {}", order.order_by_clause());
        let songs = query_as::<_, Song>(&sql).fetch_all(self.pool()).await?;
        Ok(songs)
    }

    /// Lists songs that have been played, most played first.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_most_played_songs(&self) -> Result<Vec<Song>, LibraryError> {
        let songs = query_as::<_, Song>(
            "SELECT * FROM songs WHERE play_count > 0 ORDER BY play_count DESC, last_played DESC LIMIT ?",
        )
        .bind(MOST_PLAYED_LIMIT)
        .fetch_all(self.pool())
        .await?;
        Ok(songs)
    }

    /// Lists up to `limit` songs by most recent play.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_recently_played(&self, limit: i64) -> Result<Vec<Song>, LibraryError> {
        let songs = query_as::<_, Song>(
            "SELECT * FROM songs WHERE last_played IS NOT NULL ORDER BY last_played DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(songs)
    }

    /// Finds songs whose title, artist, album or file name contains `needle`.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn search_songs(&self, needle: &str) -> Result<Vec<Song>, LibraryError> {
        let pattern = contains_pattern(needle.trim());
        let songs = query_as::<_, Song>(
            r#"
            SELECT * FROM songs
            WHERE title LIKE ?1 ESCAPE '\'
               OR artist LIKE ?1 ESCAPE '\'
               OR album LIKE ?1 ESCAPE '\'
               OR file_name LIKE ?1 ESCAPE '\'
            ORDER BY COALESCE(title, file_name) COLLATE NOCASE
            "#,
        )
        .bind(pattern)
        .fetch_all(self.pool())
        .await?;
        Ok(songs)
    }

    /// Counts the songs in the library.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_song_count(&self) -> Result<i64, LibraryError> {
        let count = query_scalar("SELECT COUNT(*) FROM songs")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    /// Sums the duration of every song, zero for an empty library.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_total_duration(&self) -> Result<i64, LibraryError> {
        let total = query_scalar("SELECT COALESCE(SUM(duration_ms), 0) FROM songs")
            .fetch_one(self.pool())
            .await?;
        Ok(total)
    }

    /// Looks up a song by id.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_song_by_id(&self, id: i64) -> Result<Option<Song>, LibraryError> {
        let song = query_as::<_, Song>("SELECT * FROM songs WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(song)
    }

    /// Looks up a song by its exact file path.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_song_by_file_path(&self, path: &str) -> Result<Option<Song>, LibraryError> {
        let song = query_as::<_, Song>("SELECT * FROM songs WHERE file_path = ?")
            .bind(path)
            .fetch_optional(self.pool())
            .await?;
        Ok(song)
    }

    /// Checks whether a song with this path is already stored.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn song_exists(&self, path: &str) -> Result<bool, LibraryError> {
        let exists: Option<i64> = query_scalar("SELECT 1 FROM songs WHERE file_path = ?")
            .bind(path)
            .fetch_optional(self.pool())
            .await?;
        Ok(exists.is_some())
    }

    /// Inserts a song, refreshing the tags of an existing row with the same path.
    ///
    /// # Returns
    ///
    /// The id of the stored row.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the statement fails.
    pub async fn insert_song(&self, song: &Song) -> Result<i64, LibraryError> {
        let mut conn = self.pool().acquire().await?;
        upsert_song(&mut conn, song).await
    }

    /// Inserts a batch of songs in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if any statement fails; nothing is stored then.
    pub async fn insert_songs(&self, songs: &[Song]) -> Result<Vec<i64>, LibraryError> {
        let mut tx = self.pool().begin().await?;
        let mut ids = Vec::with_capacity(songs.len());
        for song in songs {
            ids.push(upsert_song(&mut tx, song).await?);
        }
        tx.commit().await?;
        Ok(ids)
    }

    /// Overwrites every column of an existing song.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if no song has this id.
    pub async fn update_song(&self, song: &Song) -> Result<(), LibraryError> {
        let result = query(
            r#"
            UPDATE songs SET
                file_path = ?, file_name = ?, title = ?, artist = ?, album = ?,
                duration_ms = ?, file_size = ?, date_added = ?, last_played = ?,
                play_count = ?, track_number = ?, year = ?, genre = ?
            WHERE id = ?
            "#,
        )
        .bind(&song.file_path)
        .bind(&song.file_name)
        .bind(&song.title)
        .bind(&song.artist)
        .bind(&song.album)
        .bind(song.duration_ms)
        .bind(song.file_size)
        .bind(song.date_added)
        .bind(song.last_played)
        .bind(song.play_count)
        .bind(song.track_number)
        .bind(song.year)
        .bind(&song.genre)
        .bind(song.id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity: "song".to_string(),
                id: song.id,
            });
        }
        Ok(())
    }

    /// Records a play: bumps the counter and stamps `last_played`.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the statement fails.
    pub async fn increment_play_count(&self, id: i64) -> Result<(), LibraryError> {
        query("UPDATE songs SET play_count = play_count + 1, last_played = ? WHERE id = ?")
            .bind(now_millis())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Deletes a song by id. Playlist entries go with it.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the statement fails.
    pub async fn delete_song(&self, id: i64) -> Result<bool, LibraryError> {
        let result = query("DELETE FROM songs WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes a song by path.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the statement fails.
    pub async fn delete_song_by_file_path(&self, path: &str) -> Result<bool, LibraryError> {
        let result = query("DELETE FROM songs WHERE file_path = ?")
            .bind(path)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes the song at `path` and, if `path` was a directory, every song
    /// below it.
    ///
    /// # Returns
    ///
    /// The number of deleted songs.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the statement fails.
    pub async fn delete_songs_at_or_below(&self, path: &str) -> Result<u64, LibraryError> {
        let result = query("DELETE FROM songs WHERE file_path = ? OR file_path LIKE ? ESCAPE '\\'")
            .bind(path)
            .bind(below_directory_pattern(path))
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Points the song stored at `from` to its new location, keeping its id,
    /// statistics and playlist entries.
    ///
    /// # Returns
    ///
    /// `false` when no song is stored at `from`, or one already exists at `to`.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the statement fails.
    pub async fn move_song(&self, from: &str, to: &str, file_name: &str) -> Result<bool, LibraryError> {
        let result = query(
            r#"
            UPDATE songs SET file_path = ?, file_name = ?
            WHERE file_path = ? AND NOT EXISTS (SELECT 1 FROM songs WHERE file_path = ?)
            "#,
        )
        .bind(to)
        .bind(file_name)
        .bind(from)
        .bind(to)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every song whose path is not in `valid_paths`.
    ///
    /// The paths are staged in a temporary table so the statement is not
    /// bounded by SQLite's host parameter limit.
    ///
    /// # Returns
    ///
    /// The number of deleted songs.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if any statement fails.
    pub async fn delete_orphaned_songs(&self, valid_paths: &[String]) -> Result<u64, LibraryError> {
        let mut tx = self.pool().begin().await?;

        query("CREATE TEMP TABLE IF NOT EXISTS valid_paths (path TEXT PRIMARY KEY)")
            .execute(&mut *tx)
            .await?;
        query("DELETE FROM temp.valid_paths").execute(&mut *tx).await?;

        for path in valid_paths {
            query("INSERT OR IGNORE INTO temp.valid_paths (path) VALUES (?)")
                .bind(path)
                .execute(&mut *tx)
                .await?;
        }

        let result =
            query("DELETE FROM songs WHERE file_path NOT IN (SELECT path FROM temp.valid_paths)")
                .execute(&mut *tx)
                .await?;
        query("DROP TABLE temp.valid_paths").execute(&mut *tx).await?;

        tx.commit().await?;

        debug!("Deleted {} orphaned songs", result.rows_affected());
        Ok(result.rows_affected())
    }

    /// Deletes every song.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the statement fails.
    pub async fn delete_all_songs(&self) -> Result<(), LibraryError> {
        query("DELETE FROM songs").execute(self.pool()).await?;
        Ok(())
    }

    /// Resets play counts and last-played stamps of every song.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the statement fails.
    pub async fn clear_play_history(&self) -> Result<(), LibraryError> {
        query("UPDATE songs SET play_count = 0, last_played = NULL")
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::library::{
        database::LibraryDatabase,
        models::{Song, SongSortOrder},
        songs::contains_pattern,
    };

    fn song(path: &str, title: Option<&str>, artist: Option<&str>, duration_ms: i64) -> Song {
        Song {
            file_path: path.to_string(),
            file_name: path.rsplit('/').next().unwrap().to_string(),
            title: title.map(str::to_string),
            artist: artist.map(str::to_string),
            duration_ms,
            ..Song::default()
        }
    }

    async fn seeded() -> LibraryDatabase {
        let database = LibraryDatabase::open_in_memory().await.unwrap();
        database
            .insert_songs(&[
                song("/m/b.mp3", Some("beta"), Some("Zed"), 2_000),
                song("/m/a.mp3", Some("Alpha"), Some("Abe"), 3_000),
                song("/m/c_100%.flac", None, None, 1_000),
            ])
            .await
            .unwrap();
        database
    }

    #[tokio::test]
    async fn test_sort_orders() {
        let database = seeded().await;

        let by_title: Vec<_> = database
            .get_all_songs(SongSortOrder::Title)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.file_path)
            .collect();
        assert_eq!(by_title, ["/m/a.mp3", "/m/b.mp3", "/m/c_100%.flac"]);

        let by_duration: Vec<_> = database
            .get_all_songs(SongSortOrder::Duration)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.duration_ms)
            .collect();
        assert_eq!(by_duration, [1_000, 2_000, 3_000]);

        assert_eq!(database.get_song_count().await.unwrap(), 3);
        assert_eq!(database.get_total_duration().await.unwrap(), 6_000);
    }

    #[tokio::test]
    async fn test_upsert_keeps_id_and_stats() {
        let database = seeded().await;
        let original = database.get_song_by_file_path("/m/a.mp3").await.unwrap().unwrap();
        database.increment_play_count(original.id).await.unwrap();

        let retagged = song("/m/a.mp3", Some("Alpha (Remaster)"), Some("Abe"), 3_100);
        let id = database.insert_song(&retagged).await.unwrap();
        assert_eq!(id, original.id);

        let stored = database.get_song_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("Alpha (Remaster)"));
        assert_eq!(stored.play_count, 1);
        assert!(stored.last_played.is_some());
        assert_eq!(stored.date_added, original.date_added);
    }

    #[tokio::test]
    async fn test_search_escapes_wildcards() {
        let database = seeded().await;

        let hits = database.search_songs("100%").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_path, "/m/c_100%.flac");

        let hits = database.search_songs("zed").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title.as_deref(), Some("beta"));

        assert_eq!(database.search_songs("_").await.unwrap().len(), 1);
        assert_eq!(contains_pattern("a_b"), "%a\\_b%");
    }

    #[tokio::test]
    async fn test_play_history() {
        let database = seeded().await;
        let a = database.get_song_by_file_path("/m/a.mp3").await.unwrap().unwrap();

        assert!(database.get_recently_played(50).await.unwrap().is_empty());
        database.increment_play_count(a.id).await.unwrap();
        database.increment_play_count(a.id).await.unwrap();

        let recent = database.get_recently_played(50).await.unwrap();
        assert_eq!(recent.len(), 1);
        let most = database.get_most_played_songs().await.unwrap();
        assert_eq!(most[0].play_count, 2);

        database.clear_play_history().await.unwrap();
        assert!(database.get_recently_played(50).await.unwrap().is_empty());
        assert!(database.get_most_played_songs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_orphaned_songs() {
        let database = seeded().await;

        let deleted = database
            .delete_orphaned_songs(&["/m/a.mp3".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(database.get_song_count().await.unwrap(), 1);
        assert!(database.song_exists("/m/a.mp3").await.unwrap());

        // Staging table is dropped, so a second run works too.
        let deleted = database
            .delete_orphaned_songs(&["/m/a.mp3".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let database = seeded().await;
        let mut b = database.get_song_by_file_path("/m/b.mp3").await.unwrap().unwrap();
        b.genre = Some("Jazz".to_string());
        database.update_song(&b).await.unwrap();
        assert_eq!(
            database.get_song_by_id(b.id).await.unwrap().unwrap().genre.as_deref(),
            Some("Jazz")
        );

        assert!(database.delete_song_by_file_path("/m/b.mp3").await.unwrap());
        assert!(!database.delete_song(b.id).await.unwrap());
        assert!(database.update_song(&b).await.is_err());

        database.delete_all_songs().await.unwrap();
        assert_eq!(database.get_total_duration().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_below_directory_and_move() {
        let database = LibraryDatabase::open_in_memory().await.unwrap();
        database
            .insert_songs(&[
                song("/m/live/a.mp3", None, None, 0),
                song("/m/live/sub/b.mp3", None, None, 0),
                song("/m/lively.mp3", None, None, 0),
            ])
            .await
            .unwrap();

        let a = database.get_song_by_file_path("/m/live/a.mp3").await.unwrap().unwrap();
        assert!(database.move_song("/m/live/a.mp3", "/m/a.mp3", "a.mp3").await.unwrap());
        let moved = database.get_song_by_id(a.id).await.unwrap().unwrap();
        assert_eq!(moved.file_path, "/m/a.mp3");
        assert!(!database.move_song("/m/missing.mp3", "/m/x.mp3", "x.mp3").await.unwrap());

        assert_eq!(database.delete_songs_at_or_below("/m/live/").await.unwrap(), 1);
        assert!(database.song_exists("/m/lively.mp3").await.unwrap());
        assert_eq!(database.delete_songs_at_or_below("/m/a.mp3").await.unwrap(), 1);
        assert_eq!(database.get_song_count().await.unwrap(), 1);
    }
}
