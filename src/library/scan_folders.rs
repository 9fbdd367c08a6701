//! Scan folder queries.

use sqlx::{query, query_as, query_scalar};

use crate::{
    error::domain::LibraryError,
    library::{
        database::{LibraryDatabase, now_millis},
        models::ScanFolder,
    },
};

impl LibraryDatabase {
    /// Lists every scan folder by path.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_all_folders(&self) -> Result<Vec<ScanFolder>, LibraryError> {
        let folders = query_as::<_, ScanFolder>("SELECT * FROM scan_folders ORDER BY path")
            .fetch_all(self.pool())
            .await?;
        Ok(folders)
    }

    /// Lists the folders that take part in full scans.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_enabled_folders(&self) -> Result<Vec<ScanFolder>, LibraryError> {
        let folders =
            query_as::<_, ScanFolder>("SELECT * FROM scan_folders WHERE enabled = 1 ORDER BY path")
                .fetch_all(self.pool())
                .await?;
        Ok(folders)
    }

    /// Looks up a folder by id.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_folder_by_id(&self, id: i64) -> Result<Option<ScanFolder>, LibraryError> {
        let folder = query_as::<_, ScanFolder>("SELECT * FROM scan_folders WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(folder)
    }

    /// Looks up a folder by path.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_folder_by_path(&self, path: &str) -> Result<Option<ScanFolder>, LibraryError> {
        let folder = query_as::<_, ScanFolder>("SELECT * FROM scan_folders WHERE path = ?")
            .bind(path)
            .fetch_optional(self.pool())
            .await?;
        Ok(folder)
    }

    /// Registers a folder; an existing path is left untouched.
    ///
    /// # Returns
    ///
    /// The id of the new or existing folder.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` for a blank path or a failed statement.
    pub async fn add_folder(&self, path: &str) -> Result<i64, LibraryError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(LibraryError::InvalidData {
                reason: "Folder path cannot be empty".to_string(),
            });
        }

        query("INSERT OR IGNORE INTO scan_folders (path, enabled) VALUES (?, 1)")
            .bind(path)
            .execute(self.pool())
            .await?;

        let id = query_scalar("SELECT id FROM scan_folders WHERE path = ?")
            .bind(path)
            .fetch_one(self.pool())
            .await?;
        Ok(id)
    }

    /// Switches a folder in or out of full scans.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if no folder has this id.
    pub async fn set_folder_enabled(&self, id: i64, enabled: bool) -> Result<(), LibraryError> {
        let result = query("UPDATE scan_folders SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity: "scan folder".to_string(),
                id,
            });
        }
        Ok(())
    }

    /// Stamps a folder as scanned now.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the statement fails.
    pub async fn update_last_scanned(&self, id: i64) -> Result<(), LibraryError> {
        query("UPDATE scan_folders SET last_scanned = ? WHERE id = ?")
            .bind(now_millis())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Forgets a folder. Songs found in it stay until the next full scan.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the statement fails.
    pub async fn delete_folder(&self, id: i64) -> Result<bool, LibraryError> {
        let result = query("DELETE FROM scan_folders WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::library::database::LibraryDatabase;

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let database = LibraryDatabase::open_in_memory().await.unwrap();

        let first = database.add_folder("/music").await.unwrap();
        let second = database.add_folder(" /music ").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(database.get_all_folders().await.unwrap().len(), 1);
        assert!(database.add_folder("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_enable_disable_and_scan_stamp() {
        let database = LibraryDatabase::open_in_memory().await.unwrap();
        let music = database.add_folder("/music").await.unwrap();
        database.add_folder("/audiobooks").await.unwrap();

        database.set_folder_enabled(music, false).await.unwrap();
        let enabled = database.get_enabled_folders().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].path, "/audiobooks");

        assert!(database.set_folder_enabled(999, true).await.is_err());

        database.update_last_scanned(music).await.unwrap();
        let folder = database.get_folder_by_path("/music").await.unwrap().unwrap();
        assert!(folder.last_scanned.is_some());
        assert!(!folder.enabled);

        assert!(database.delete_folder(music).await.unwrap());
        assert!(database.get_folder_by_id(music).await.unwrap().is_none());
    }
}
