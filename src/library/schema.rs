//! Database schema definition and versioning for the music library.
//!
//! Creates the SQLite tables on first use and refuses to open a database
//! written by a different schema version.

use std::{path::Path, str::FromStr};

use {
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    },
    thiserror::Error,
    tracing::debug,
};

/// Error type for schema operations.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),
    /// The database file or its directory could not be prepared.
    #[error("Database file error: {0}")]
    Io(#[from] std::io::Error),
    /// The stored schema version is not the one this build understands.
    #[error("Schema migration error: {reason}")]
    MigrationError { reason: String },
}

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Table and index definitions, executed in order on a fresh database.
const CREATE_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE songs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL UNIQUE,
        file_name TEXT NOT NULL,
        title TEXT,
        artist TEXT,
        album TEXT,
        duration_ms INTEGER NOT NULL DEFAULT 0,
        file_size INTEGER NOT NULL DEFAULT 0,
        date_added INTEGER NOT NULL,
        last_played INTEGER,
        play_count INTEGER NOT NULL DEFAULT 0,
        track_number INTEGER,
        year INTEGER,
        genre TEXT
    )
    "#,
    r#"
    CREATE TABLE playlists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        last_played INTEGER
    )
    "#,
    r#"
    CREATE TABLE playlist_songs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        playlist_id INTEGER NOT NULL,
        song_id INTEGER NOT NULL,
        position INTEGER NOT NULL,
        added_at INTEGER NOT NULL,
        FOREIGN KEY (playlist_id) REFERENCES playlists (id) ON DELETE CASCADE,
        FOREIGN KEY (song_id) REFERENCES songs (id) ON DELETE CASCADE,
        UNIQUE (playlist_id, song_id)
    )
    "#,
    r#"
    CREATE TABLE scan_folders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT NOT NULL UNIQUE,
        enabled INTEGER NOT NULL DEFAULT 1,
        last_scanned INTEGER
    )
    "#,
    r#"
    CREATE TABLE eq_presets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        is_custom INTEGER NOT NULL DEFAULT 0,
        band_60hz INTEGER NOT NULL DEFAULT 0,
        band_250hz INTEGER NOT NULL DEFAULT 0,
        band_1khz INTEGER NOT NULL DEFAULT 0,
        band_4khz INTEGER NOT NULL DEFAULT 0,
        band_16khz INTEGER NOT NULL DEFAULT 0,
        bass_boost INTEGER NOT NULL DEFAULT 0,
        virtualizer INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX idx_songs_artist ON songs (artist)",
    "CREATE INDEX idx_songs_album ON songs (album)",
    "CREATE INDEX idx_songs_title ON songs (title)",
    "CREATE INDEX idx_playlist_songs_playlist ON playlist_songs (playlist_id, position)",
    "CREATE INDEX idx_playlist_songs_song ON playlist_songs (song_id)",
    // Keeps playlist positions dense, including deletes cascaded from songs.
    r#"
    CREATE TRIGGER playlist_songs_close_gap AFTER DELETE ON playlist_songs
    BEGIN
        UPDATE playlist_songs SET position = position - 1
        WHERE playlist_id = OLD.playlist_id AND position > OLD.position;
    END
    "#,
];

/// Database schema definition.
pub struct SchemaManager {
    pool: SqlitePool,
}

impl SchemaManager {
    /// Creates a new schema manager.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initializes the database schema.
    ///
    /// A fresh database gets every table and the current version stamp; an
    /// existing one must already carry the current version.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if table creation fails or the stored version
    /// differs from `CURRENT_SCHEMA_VERSION`.
    pub async fn initialize_schema(&self) -> Result<(), SchemaError> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        match self.stored_version().await? {
            None => {
                debug!("Creating library schema version {CURRENT_SCHEMA_VERSION}");
                self.create_tables().await?;
            }
            Some(version) if version == CURRENT_SCHEMA_VERSION => {}
            Some(version) => {
                return Err(SchemaError::MigrationError {
                    reason: format!(
                        "database is at version {version}, expected {CURRENT_SCHEMA_VERSION}"
                    ),
                });
            }
        }

        Ok(())
    }

    /// Creates all tables and stamps the version in one transaction.
    async fn create_tables(&self) -> Result<(), SchemaError> {
        let mut tx = self.pool.begin().await?;

        for statement in CREATE_STATEMENTS.iter().copied() {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(CURRENT_SCHEMA_VERSION)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn stored_version(&self) -> Result<Option<i32>, SchemaError> {
        let has_table: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
        )
        .fetch_optional(&self.pool)
        .await?;
        if has_table.is_none() {
            return Ok(None);
        }

        let version = sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(version)
    }

    /// Gets the current schema version, or 0 if not initialized.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the version table cannot be read.
    pub async fn get_current_version(&self) -> Result<i32, SchemaError> {
        Ok(self.stored_version().await?.unwrap_or(0))
    }
}

/// Creates a connection pool for the database file at `path`.
///
/// The file and its parent directory are created when missing.
///
/// # Errors
///
/// Returns `SchemaError` if the directory or the pool cannot be created.
pub async fn create_connection_pool(path: &Path) -> Result<SqlitePool, SchemaError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// Creates a single-connection in-memory pool.
///
/// Every connection to `:memory:` gets its own database, so the pool is
/// capped at one connection.
///
/// # Errors
///
/// Returns `SchemaError` if the pool cannot be created.
pub async fn create_memory_pool() -> Result<SqlitePool, SchemaError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use std::fs::write;

    use tempfile::tempdir;

    use crate::library::schema::{
        CURRENT_SCHEMA_VERSION, SchemaError, SchemaManager, create_connection_pool,
        create_memory_pool,
    };

    #[tokio::test]
    async fn test_initialize_creates_tables_once() {
        let pool = create_memory_pool().await.unwrap();
        let manager = SchemaManager::new(pool.clone());

        assert_eq!(manager.get_current_version().await.unwrap(), 0);
        manager.initialize_schema().await.unwrap();
        manager.initialize_schema().await.unwrap();
        assert_eq!(
            manager.get_current_version().await.unwrap(),
            CURRENT_SCHEMA_VERSION
        );

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(
            tables,
            [
                "eq_presets",
                "playlist_songs",
                "playlists",
                "scan_folders",
                "schema_version",
                "songs"
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_version_is_rejected() {
        let pool = create_memory_pool().await.unwrap();
        let manager = SchemaManager::new(pool.clone());
        manager.initialize_schema().await.unwrap();

        sqlx::query("UPDATE schema_version SET version = 99")
            .execute(&pool)
            .await
            .unwrap();

        let result = manager.initialize_schema().await;
        assert!(matches!(result, Err(SchemaError::MigrationError { .. })));
    }

    #[tokio::test]
    async fn test_fresh_database_reports_version_zero() {
        let pool = create_memory_pool().await.unwrap();
        let manager = SchemaManager::new(pool.clone());

        assert_eq!(manager.get_current_version().await.unwrap(), 0);
        let tables: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[tokio::test]
    async fn test_unusable_directory_is_an_io_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        write(&blocker, b"file").unwrap();

        let result = create_connection_pool(&blocker.join("library.db")).await;
        match result {
            Err(e @ SchemaError::Io(_)) => {
                assert!(e.to_string().starts_with("Database file error"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_schema_error_display() {
        let migration_error = SchemaError::MigrationError {
            reason: "test error".to_string(),
        };
        assert_eq!(
            migration_error.to_string(),
            "Schema migration error: test error"
        );
    }
}
