//! Library database interface using sqlx with SQLite.
//!
//! `LibraryDatabase` owns the connection pool. Queries are grouped by table
//! in the sibling `songs`, `playlists`, `scan_folders` and `presets`
//! modules, each adding methods to this type.

use std::path::Path;

use {chrono::Utc, sqlx::SqlitePool, tracing::info};

use crate::{
    config::get_data_dir,
    error::domain::LibraryError,
    library::schema::{SchemaManager, create_connection_pool, create_memory_pool},
};

/// File name of the library database inside the data directory.
pub const DATABASE_FILE_NAME: &str = "library.db";

/// Main library database interface.
#[derive(Debug, Clone)]
pub struct LibraryDatabase {
    pool: SqlitePool,
}

impl LibraryDatabase {
    /// Opens the library database in the XDG data directory.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if database initialization fails.
    pub async fn new() -> Result<Self, LibraryError> {
        Self::open(&get_data_dir().join(DATABASE_FILE_NAME)).await
    }

    /// Opens (or creates) the library database at `path`.
    ///
    /// The schema is created on first use and the built-in equalizer
    /// presets are seeded when none exist.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the pool, the schema or the seed fails.
    pub async fn open(path: &Path) -> Result<Self, LibraryError> {
        info!("Opening library database at {}", path.display());
        let pool = create_connection_pool(path).await?;
        Self::from_pool(pool).await
    }

    /// Opens a private in-memory library.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the schema or the seed fails.
    pub async fn open_in_memory() -> Result<Self, LibraryError> {
        let pool = create_memory_pool().await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, LibraryError> {
        SchemaManager::new(pool.clone()).initialize_schema().await?;

        let database = LibraryDatabase { pool };
        database.seed_built_in_presets().await?;
        Ok(database)
    }

    /// Gets the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Current time as Unix milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::library::database::{LibraryDatabase, now_millis};

    #[tokio::test]
    async fn test_open_file_database_twice() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("library.db");

        let database = LibraryDatabase::open(&path).await.unwrap();
        let first_count = database.get_all_presets().await.unwrap().len();
        database.pool().close().await;

        let database = LibraryDatabase::open(&path).await.unwrap();
        assert_eq!(database.get_all_presets().await.unwrap().len(), first_count);
        assert!(path.exists());
    }

    #[test]
    fn test_now_millis_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(now_millis() > 1_577_836_800_000);
    }
}
