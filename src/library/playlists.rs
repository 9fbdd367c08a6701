//! Playlist queries and playlist membership.
//!
//! Positions inside a playlist are kept dense (`0..len`) by a schema
//! trigger, so a position is also the index of the song in the ordered
//! listing.

use {
    sqlx::{SqliteConnection, query, query_as, query_scalar},
    tracing::debug,
};

use crate::{
    error::domain::LibraryError,
    library::{
        database::{LibraryDatabase, now_millis},
        models::{Playlist, PlaylistWithSongs, Song},
        songs::contains_pattern,
    },
};

const PLAYLIST_SELECT: &str = r#"
    SELECT p.id, p.name, p.description, p.created_at, p.updated_at, p.last_played,
           COUNT(s.id) AS song_count,
           COALESCE(SUM(s.duration_ms), 0) AS total_duration_ms
    FROM playlists p
    LEFT JOIN playlist_songs ps ON ps.playlist_id = p.id
    LEFT JOIN songs s ON s.id = ps.song_id
"#;

/// Trims a playlist name and rejects blank ones.
fn normalize_name(name: &str) -> Result<String, LibraryError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LibraryError::InvalidData {
            reason: "Playlist name cannot be empty".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Trims a description, mapping blank ones to `None`.
fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

fn playlist_not_found(id: i64) -> LibraryError {
    LibraryError::NotFound {
        entity: "playlist".to_string(),
        id,
    }
}

async fn insert_playlist(
    conn: &mut SqliteConnection,
    name: &str,
    description: Option<&str>,
) -> Result<i64, LibraryError> {
    let now = now_millis();
    let id = query_scalar(
        "INSERT INTO playlists (name, description, created_at, updated_at) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(description)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Appends a song unless it is already in the playlist.
async fn append_song(
    conn: &mut SqliteConnection,
    playlist_id: i64,
    song_id: i64,
) -> Result<bool, LibraryError> {
    let result = query(
        r#"
        INSERT OR IGNORE INTO playlist_songs (playlist_id, song_id, position, added_at)
        SELECT ?1, ?2,
               (SELECT COALESCE(MAX(position), -1) + 1 FROM playlist_songs WHERE playlist_id = ?1),
               ?3
        "#,
    )
    .bind(playlist_id)
    .bind(song_id)
    .bind(now_millis())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn touch(conn: &mut SqliteConnection, playlist_id: i64) -> Result<(), LibraryError> {
    query("UPDATE playlists SET updated_at = ? WHERE id = ?")
        .bind(now_millis())
        .bind(playlist_id)
        .execute(conn)
        .await?;
    Ok(())
}

impl LibraryDatabase {
    /// Lists playlists with song count and duration, by name.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_all_playlists(&self) -> Result<Vec<Playlist>, LibraryError> {
        let sql = format!("{PLAYLIST_SELECT} GROUP BY p.id ORDER BY p.name COLLATE NOCASE");
        let playlists = query_as::<_, Playlist>(&sql).fetch_all(self.pool()).await?;
        Ok(playlists)
    }

    /// Looks up one playlist with its aggregates.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_playlist_by_id(&self, id: i64) -> Result<Option<Playlist>, LibraryError> {
        let sql = format!("{PLAYLIST_SELECT} WHERE p.id = ? GROUP BY p.id");
        let playlist = query_as::<_, Playlist>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(playlist)
    }

    /// Loads a playlist together with its ordered songs.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if a query fails.
    pub async fn get_playlist_with_songs(
        &self,
        id: i64,
    ) -> Result<Option<PlaylistWithSongs>, LibraryError> {
        let Some(playlist) = self.get_playlist_by_id(id).await? else {
            return Ok(None);
        };
        let songs = self.get_songs_for_playlist(id).await?;
        Ok(Some(PlaylistWithSongs { playlist, songs }))
    }

    /// Finds playlists whose name or description contains `needle`.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn search_playlists(&self, needle: &str) -> Result<Vec<Playlist>, LibraryError> {
        let sql = format!(
            r#"{PLAYLIST_SELECT}
            WHERE p.name LIKE ?1 ESCAPE '\' OR p.description LIKE ?1 ESCAPE '\'
            GROUP BY p.id ORDER BY p.name COLLATE NOCASE"#
        );
        let playlists = query_as::<_, Playlist>(&sql)
            .bind(contains_pattern(needle.trim()))
            .fetch_all(self.pool())
            .await?;
        Ok(playlists)
    }

    /// Lists the songs of a playlist in playlist order.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_songs_for_playlist(&self, playlist_id: i64) -> Result<Vec<Song>, LibraryError> {
        let songs = query_as::<_, Song>(
            r#"
            SELECT s.* FROM songs s
            JOIN playlist_songs ps ON ps.song_id = s.id
            WHERE ps.playlist_id = ?
            ORDER BY ps.position
            "#,
        )
        .bind(playlist_id)
        .fetch_all(self.pool())
        .await?;
        Ok(songs)
    }

    /// Ids of the playlists that contain a song.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_playlists_containing_song(&self, song_id: i64) -> Result<Vec<i64>, LibraryError> {
        let ids = query_scalar("SELECT playlist_id FROM playlist_songs WHERE song_id = ?")
            .bind(song_id)
            .fetch_all(self.pool())
            .await?;
        Ok(ids)
    }

    /// Creates an empty playlist.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::InvalidData` for a blank name.
    pub async fn create_playlist(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<i64, LibraryError> {
        let name = normalize_name(name)?;
        let description = normalize_description(description);
        let mut conn = self.pool().acquire().await?;
        let id = insert_playlist(&mut conn, &name, description.as_deref()).await?;
        debug!("Created playlist {id} \"{name}\"");
        Ok(id)
    }

    /// Saves the name and description of a playlist.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` for a blank name or a missing playlist.
    pub async fn update_playlist(&self, playlist: &Playlist) -> Result<(), LibraryError> {
        let name = normalize_name(&playlist.name)?;
        let result = query("UPDATE playlists SET name = ?, description = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(normalize_description(playlist.description.as_deref()))
            .bind(now_millis())
            .bind(playlist.id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(playlist_not_found(playlist.id));
        }
        Ok(())
    }

    /// Renames a playlist.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` for a blank name or a missing playlist.
    pub async fn rename_playlist(&self, id: i64, new_name: &str) -> Result<(), LibraryError> {
        let name = normalize_name(new_name)?;
        let result = query("UPDATE playlists SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(now_millis())
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(playlist_not_found(id));
        }
        Ok(())
    }

    /// Stamps the playlist as played now.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the statement fails.
    pub async fn update_last_played(&self, id: i64) -> Result<(), LibraryError> {
        query("UPDATE playlists SET last_played = ? WHERE id = ?")
            .bind(now_millis())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Deletes a playlist and its memberships.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the statement fails.
    pub async fn delete_playlist(&self, id: i64) -> Result<bool, LibraryError> {
        let result = query("DELETE FROM playlists WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Appends a song to a playlist.
    ///
    /// # Returns
    ///
    /// `false` if the song was already in the playlist.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the playlist or song does not exist.
    pub async fn add_song_to_playlist(
        &self,
        playlist_id: i64,
        song_id: i64,
    ) -> Result<bool, LibraryError> {
        let mut tx = self.pool().begin().await?;
        let added = append_song(&mut tx, playlist_id, song_id).await?;
        if added {
            touch(&mut tx, playlist_id).await?;
        }
        tx.commit().await?;
        Ok(added)
    }

    /// Appends several songs, skipping those already present.
    ///
    /// # Returns
    ///
    /// The number of songs actually added.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if any insert fails; nothing is added then.
    pub async fn add_songs_to_playlist(
        &self,
        playlist_id: i64,
        song_ids: &[i64],
    ) -> Result<usize, LibraryError> {
        let mut tx = self.pool().begin().await?;
        let mut added = 0;
        for &song_id in song_ids {
            if append_song(&mut tx, playlist_id, song_id).await? {
                added += 1;
            }
        }
        if added > 0 {
            touch(&mut tx, playlist_id).await?;
        }
        tx.commit().await?;
        Ok(added)
    }

    /// Removes a song; later songs move up one position.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if a statement fails.
    pub async fn remove_song_from_playlist(
        &self,
        playlist_id: i64,
        song_id: i64,
    ) -> Result<bool, LibraryError> {
        let mut tx = self.pool().begin().await?;
        let result = query("DELETE FROM playlist_songs WHERE playlist_id = ? AND song_id = ?")
            .bind(playlist_id)
            .bind(song_id)
            .execute(&mut *tx)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            touch(&mut tx, playlist_id).await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    /// Removes every song from a playlist.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the statement fails.
    pub async fn clear_playlist(&self, playlist_id: i64) -> Result<(), LibraryError> {
        let mut tx = self.pool().begin().await?;
        query("DELETE FROM playlist_songs WHERE playlist_id = ?")
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;
        touch(&mut tx, playlist_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Moves the song at position `from` to position `to`.
    ///
    /// Songs in between shift by one toward the vacated slot.
    ///
    /// # Returns
    ///
    /// `false` when nothing moved (same position or empty slot).
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if a statement fails.
    pub async fn reorder_playlist(
        &self,
        playlist_id: i64,
        from: i64,
        to: i64,
    ) -> Result<bool, LibraryError> {
        if from == to {
            return Ok(false);
        }

        let mut tx = self.pool().begin().await?;

        let moving: Option<i64> = query_scalar(
            "SELECT song_id FROM playlist_songs WHERE playlist_id = ? AND position = ?",
        )
        .bind(playlist_id)
        .bind(from)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(song_id) = moving else {
            return Ok(false);
        };

        let len: i64 = query_scalar("SELECT COUNT(*) FROM playlist_songs WHERE playlist_id = ?")
            .bind(playlist_id)
            .fetch_one(&mut *tx)
            .await?;
        let to = to.clamp(0, len - 1);

        if from < to {
            query(
                "UPDATE playlist_songs SET position = position - 1 WHERE playlist_id = ? AND position > ? AND position <= ?",
            )
            .bind(playlist_id)
            .bind(from)
            .bind(to)
            .execute(&mut *tx)
            .await?;
        } else {
            query(
                "UPDATE playlist_songs SET position = position + 1 WHERE playlist_id = ? AND position >= ? AND position < ?",
            )
            .bind(playlist_id)
            .bind(to)
            .bind(from)
            .execute(&mut *tx)
            .await?;
        }

        query("UPDATE playlist_songs SET position = ? WHERE playlist_id = ? AND song_id = ?")
            .bind(to)
            .bind(playlist_id)
            .bind(song_id)
            .execute(&mut *tx)
            .await?;
        touch(&mut tx, playlist_id).await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Copies a playlist's description and songs under a new name.
    ///
    /// # Returns
    ///
    /// The id of the new playlist.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if the source playlist is missing.
    pub async fn duplicate_playlist(&self, id: i64, new_name: &str) -> Result<i64, LibraryError> {
        let name = normalize_name(new_name)?;
        let mut tx = self.pool().begin().await?;

        let description: Option<Option<String>> =
            query_scalar("SELECT description FROM playlists WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(description) = description else {
            return Err(playlist_not_found(id));
        };

        let copy_id = insert_playlist(&mut tx, &name, description.as_deref()).await?;
        query(
            r#"
            INSERT INTO playlist_songs (playlist_id, song_id, position, added_at)
            SELECT ?, song_id, position, ? FROM playlist_songs WHERE playlist_id = ?
            "#,
        )
        .bind(copy_id)
        .bind(now_millis())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(copy_id)
    }

    /// Creates a playlist holding `song_ids` in the given order.
    ///
    /// Repeated ids are stored once, at their first position.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` for a blank name or a failed insert.
    pub async fn save_songs_as_playlist(
        &self,
        name: &str,
        description: Option<&str>,
        song_ids: &[i64],
    ) -> Result<i64, LibraryError> {
        let name = normalize_name(name)?;
        let description = normalize_description(description);

        let mut tx = self.pool().begin().await?;
        let id = insert_playlist(&mut tx, &name, description.as_deref()).await?;
        for &song_id in song_ids {
            append_song(&mut tx, id, song_id).await?;
        }
        tx.commit().await?;
        Ok(id)
    }
}
