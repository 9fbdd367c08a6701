//! Library scanner coordinator.
//!
//! Walks the configured scan folders, adds new audio files to the library,
//! drops songs whose files disappeared, and publishes its progress. When
//! automatic scanning is on, the scan folders are also watched and changes
//! are applied as they happen.

use std::{
    fs::read_dir,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    async_channel::{Receiver, bounded},
    parking_lot::Mutex,
    serde::{Deserialize, Serialize},
    tokio::{
        spawn,
        sync::{
            broadcast::{Receiver as TokioReceiver, Sender, channel},
            watch,
        },
        task::JoinHandle,
    },
    tracing::{debug, error, info, warn},
};

use crate::{
    config::settings::UserSettings,
    error::domain::LibraryError,
    library::{
        database::LibraryDatabase,
        file_watcher::{ChangeBatch, DebouncedEventProcessor, FileWatcher, is_supported_audio_file},
        models::ScanFolder,
        scanner::handlers::{apply_change_batch, build_song},
    },
};

mod config;
pub mod handlers;

pub use config::ScannerConfig;

/// Events emitted by the library scanner.
#[derive(Debug, Clone)]
pub enum ScannerEvent {
    /// The library has been modified (add/remove/update).
    LibraryChanged,
}

/// Live progress of a running scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Whether a scan is running.
    pub is_scanning: bool,
    /// Folder currently being walked.
    pub current_folder: Option<String>,
    /// Audio files examined so far.
    pub files_scanned: usize,
    /// Audio files found so far.
    pub files_found: usize,
    /// Songs added to the library so far.
    pub new_songs_added: usize,
}

/// Totals of a finished scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Audio files examined.
    pub files_scanned: usize,
    /// Audio files found.
    pub files_found: usize,
    /// Songs added to the library.
    pub new_songs_added: usize,
}

#[derive(Debug, Default)]
struct FolderScan {
    result: ScanResult,
    valid_paths: Vec<String>,
}

/// Running watcher plus the tasks feeding it into the library.
struct WatchSession {
    watcher: FileWatcher,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Library scanner coordinator.
pub struct LibraryScanner {
    /// Database interface.
    database: Arc<LibraryDatabase>,
    /// Configuration.
    config: ScannerConfig,
    /// Progress publisher.
    progress: watch::Sender<ScanProgress>,
    /// Event sender for scanner notifications.
    event_sender: Sender<ScannerEvent>,
    /// Active file watching, if started.
    watch_session: Mutex<Option<WatchSession>>,
}

impl LibraryScanner {
    /// Creates a new library scanner.
    pub fn new(database: Arc<LibraryDatabase>, config: Option<ScannerConfig>) -> Self {
        let (progress, _) = watch::channel(ScanProgress::default());
        let (event_sender, _) = channel(16);

        Self {
            database,
            config: config.unwrap_or_default(),
            progress,
            event_sender,
            watch_session: Mutex::new(None),
        }
    }

    /// Subscribe to scanner events.
    pub fn subscribe(&self) -> TokioReceiver<ScannerEvent> {
        self.event_sender.subscribe()
    }

    /// Subscribe to scan progress.
    pub fn subscribe_progress(&self) -> watch::Receiver<ScanProgress> {
        self.progress.subscribe()
    }

    /// Current scan progress.
    pub fn progress(&self) -> ScanProgress {
        self.progress.borrow().clone()
    }

    /// The library this scanner writes to.
    pub fn database(&self) -> &Arc<LibraryDatabase> {
        &self.database
    }

    /// Gets the current scanner configuration.
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Scans every enabled folder.
    ///
    /// New audio files are added and each folder's `last_scanned` is stamped.
    /// Songs whose files were not found are deleted afterwards, but only if
    /// the scan found at least one file, so an unmounted drive does not
    /// empty the library.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if a database statement fails.
    pub async fn scan_all_folders(&self) -> Result<ScanResult, LibraryError> {
        let folders = self.database.get_enabled_folders().await?;
        if folders.is_empty() {
            debug!("No enabled scan folders");
            return Ok(ScanResult::default());
        }

        self.progress.send_replace(ScanProgress {
            is_scanning: true,
            ..ScanProgress::default()
        });
        let outcome = self.scan_folders(&folders).await;
        self.progress.send_replace(ScanProgress::default());
        outcome
    }

    async fn scan_folders(&self, folders: &[ScanFolder]) -> Result<ScanResult, LibraryError> {
        let mut totals = ScanResult::default();
        let mut all_valid_paths = Vec::new();

        for folder in folders {
            self.progress
                .send_modify(|progress| progress.current_folder = Some(folder.path.clone()));

            let mut scan = self.scan_folder(Path::new(&folder.path)).await?;
            totals.files_scanned += scan.result.files_scanned;
            totals.files_found += scan.result.files_found;
            totals.new_songs_added += scan.result.new_songs_added;
            all_valid_paths.append(&mut scan.valid_paths);

            self.database.update_last_scanned(folder.id).await?;
        }

        let mut removed = 0;
        if !all_valid_paths.is_empty() {
            removed = self.database.delete_orphaned_songs(&all_valid_paths).await?;
        }

        info!(
            "Scanned {} folders: {} files, {} new songs, {} removed",
            folders.len(),
            totals.files_found,
            totals.new_songs_added,
            removed
        );
        if totals.new_songs_added > 0 || removed > 0 {
            let _ = self.event_sender.send(ScannerEvent::LibraryChanged);
        }
        Ok(totals)
    }

    /// Scans one directory without touching songs found elsewhere.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if a database statement fails.
    pub async fn scan_single_folder<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<ScanResult, LibraryError> {
        let path = path.as_ref();
        self.progress.send_replace(ScanProgress {
            is_scanning: true,
            current_folder: Some(path.to_string_lossy().into_owned()),
            ..ScanProgress::default()
        });
        let outcome = self.scan_folder(path).await;
        self.progress.send_replace(ScanProgress::default());

        let scan = outcome?;
        if scan.result.new_songs_added > 0 {
            let _ = self.event_sender.send(ScannerEvent::LibraryChanged);
        }
        Ok(scan.result)
    }

    async fn scan_folder(&self, directory: &Path) -> Result<FolderScan, LibraryError> {
        if !directory.is_dir() {
            warn!("Scan folder {:?} is not a directory", directory);
            return Ok(FolderScan::default());
        }

        let audio_files = Self::collect_audio_files_from_directory(directory);
        let mut scan = FolderScan {
            result: ScanResult {
                files_found: audio_files.len(),
                ..ScanResult::default()
            },
            valid_paths: Vec::with_capacity(audio_files.len()),
        };

        for file in audio_files {
            let path = file.to_string_lossy().into_owned();
            scan.result.files_scanned += 1;
            self.progress.send_modify(|progress| {
                progress.files_scanned += 1;
                progress.files_found += 1;
            });

            if !self.database.song_exists(&path).await? {
                self.database.insert_song(&build_song(&file)).await?;
                scan.result.new_songs_added += 1;
                self.progress
                    .send_modify(|progress| progress.new_songs_added += 1);
            }
            scan.valid_paths.push(path);
        }

        Ok(scan)
    }

    /// Recursively collects supported audio files below `dir_path`.
    ///
    /// Directories whose name starts with a dot are skipped and symbolic
    /// links to directories are not followed. Unreadable directories
    /// contribute nothing.
    pub fn collect_audio_files_from_directory(dir_path: &Path) -> Vec<PathBuf> {
        let mut audio_files = Vec::new();
        let mut pending = vec![dir_path.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let Ok(entries) = read_dir(&dir) else {
                debug!("Cannot read directory {:?}", dir);
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };

                if file_type.is_dir() {
                    if !entry.file_name().to_string_lossy().starts_with('.') {
                        pending.push(path);
                    }
                } else if is_supported_audio_file(&path) && path.is_file() {
                    audio_files.push(path);
                }
            }
        }

        audio_files.sort();
        audio_files
    }

    /// Starts watching `folders` and applying their changes to the library.
    ///
    /// Any previous watch is stopped first. Folders that cannot be watched
    /// are logged and skipped. Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the platform watcher cannot be created.
    pub fn start_watching<P: AsRef<Path>>(&self, folders: &[P]) -> Result<(), LibraryError> {
        self.stop_watching();

        let (event_sender, event_receiver) = bounded(self.config.event_capacity);
        let (batch_sender, batch_receiver) = bounded(self.config.batch_capacity);

        let mut watcher = FileWatcher::new(event_sender, self.config.include_hidden)?;
        for folder in folders {
            if let Err(e) = watcher.watch_directory(folder) {
                warn!("Failed to watch directory {:?}: {}", folder.as_ref(), e);
            }
        }

        let debouncer =
            DebouncedEventProcessor::new(event_receiver, batch_sender, self.config.debounce_delay);

        let database = Arc::clone(&self.database);
        let notifier = self.event_sender.clone();
        let tasks = vec![
            spawn(debouncer.start_processing()),
            spawn(Self::apply_batches(batch_receiver, database, notifier)),
        ];

        *self.watch_session.lock() = Some(WatchSession { watcher, tasks });
        Ok(())
    }

    /// Watches every enabled folder when `auto_scan` is on, and stops any
    /// running watch when it is off.
    ///
    /// # Returns
    ///
    /// Whether a watch is running afterwards.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the folders cannot be read or the platform
    /// watcher cannot be created.
    pub async fn apply_auto_scan(&self, settings: &UserSettings) -> Result<bool, LibraryError> {
        if !settings.auto_scan {
            self.stop_watching();
            return Ok(false);
        }

        let folders: Vec<PathBuf> = self
            .database
            .get_enabled_folders()
            .await?
            .into_iter()
            .map(|folder| PathBuf::from(folder.path))
            .filter(|path| path.is_dir())
            .collect();
        self.start_watching(&folders)?;
        info!("Watching {} scan folders", folders.len());
        Ok(true)
    }

    /// Stops watching, if running.
    pub fn stop_watching(&self) {
        if self.watch_session.lock().take().is_some() {
            debug!("Stopped watching scan folders");
        }
    }

    /// Folders currently watched.
    pub fn watched_folders(&self) -> Vec<PathBuf> {
        self.watch_session
            .lock()
            .as_ref()
            .map(|session| session.watcher.watched_paths())
            .unwrap_or_default()
    }

    /// Adds a folder to the running watch.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the folder cannot be watched. Without a
    /// running watch this does nothing.
    pub fn watch_folder<P: AsRef<Path>>(&self, path: P) -> Result<(), LibraryError> {
        match self.watch_session.lock().as_mut() {
            Some(session) => session.watcher.watch_directory(path),
            None => Ok(()),
        }
    }

    /// Removes a folder from the running watch.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the folder cannot be unwatched.
    pub fn unwatch_folder<P: AsRef<Path>>(&self, path: P) -> Result<(), LibraryError> {
        match self.watch_session.lock().as_mut() {
            Some(session) => session.watcher.unwatch_directory(path),
            None => Ok(()),
        }
    }

    /// Applies debounced change batches to the library.
    async fn apply_batches(
        receiver: Receiver<ChangeBatch>,
        database: Arc<LibraryDatabase>,
        notifier: Sender<ScannerEvent>,
    ) {
        while let Ok(batch) = receiver.recv().await {
            match apply_change_batch(batch, &database).await {
                Ok(()) => {
                    let _ = notifier.send(ScannerEvent::LibraryChanged);
                }
                Err(e) => error!("Error applying file system changes: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs::{create_dir_all, remove_file, write},
        path::Path,
        sync::Arc,
        time::Duration,
    };

    use tempfile::tempdir;

    use crate::{
        config::settings::UserSettings,
        library::{
            database::LibraryDatabase,
            scanner::{LibraryScanner, ScanProgress, ScanResult, ScannerConfig, ScannerEvent},
        },
    };

    fn touch(path: &Path) {
        create_dir_all(path.parent().unwrap()).unwrap();
        write(path, b"not really audio").unwrap();
    }

    async fn scanner() -> LibraryScanner {
        let database = Arc::new(LibraryDatabase::open_in_memory().await.unwrap());
        LibraryScanner::new(database, None)
    }

    #[test]
    fn test_scanner_config_default() {
        let config = ScannerConfig::default();
        assert_eq!(config.debounce_delay, Duration::from_millis(500));
        assert!(!config.include_hidden);
    }

    #[test]
    fn test_collect_skips_dot_directories_and_other_files() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("a.mp3"));
        touch(&dir.path().join("sub/b.FLAC"));
        touch(&dir.path().join("sub/deeper/c.m4a"));
        touch(&dir.path().join(".hidden/d.mp3"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("e.opus"));

        let files = LibraryScanner::collect_audio_files_from_directory(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.mp3", "b.FLAC", "c.m4a"]);
    }

    #[tokio::test]
    async fn test_no_enabled_folders_yields_zeros() {
        let scanner = scanner().await;
        assert_eq!(scanner.scan_all_folders().await.unwrap(), ScanResult::default());
    }

    #[tokio::test]
    async fn test_scan_all_adds_then_prunes() {
        let dir = tempdir().unwrap();
        let scanner = scanner().await;
        let database = Arc::clone(&scanner.database);
        let mut events = scanner.subscribe();

        touch(&dir.path().join("one.mp3"));
        touch(&dir.path().join("album/two.ogg"));
        let folder_id = database
            .add_folder(&dir.path().to_string_lossy())
            .await
            .unwrap();

        let first = scanner.scan_all_folders().await.unwrap();
        assert_eq!(
            first,
            ScanResult {
                files_scanned: 2,
                files_found: 2,
                new_songs_added: 2,
            }
        );
        assert!(matches!(events.try_recv(), Ok(ScannerEvent::LibraryChanged)));
        assert_eq!(scanner.progress(), ScanProgress::default());
        let folder = database.get_folder_by_id(folder_id).await.unwrap().unwrap();
        assert!(folder.last_scanned.is_some());

        let second = scanner.scan_all_folders().await.unwrap();
        assert_eq!(second.new_songs_added, 0);
        assert!(events.try_recv().is_err());

        remove_file(dir.path().join("one.mp3")).unwrap();
        scanner.scan_all_folders().await.unwrap();
        assert_eq!(database.get_song_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_scan_keeps_library() {
        let dir = tempdir().unwrap();
        let scanner = scanner().await;
        let database = Arc::clone(&scanner.database);

        touch(&dir.path().join("one.mp3"));
        scanner.scan_single_folder(dir.path()).await.unwrap();
        assert_eq!(database.get_song_count().await.unwrap(), 1);

        database
            .add_folder(&dir.path().join("unplugged").to_string_lossy())
            .await
            .unwrap();
        let result = scanner.scan_all_folders().await.unwrap();
        assert_eq!(result.files_found, 0);
        assert_eq!(database.get_song_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_single_folder_scan_reports_progress() {
        let dir = tempdir().unwrap();
        let scanner = scanner().await;
        let progress = scanner.subscribe_progress();
        touch(&dir.path().join("a.wav"));
        touch(&dir.path().join("b.aac"));

        let result = scanner.scan_single_folder(dir.path()).await.unwrap();
        assert_eq!(result.new_songs_added, 2);
        assert!(!progress.borrow().is_scanning);
        assert!(scanner.watched_folders().is_empty());
    }

    #[tokio::test]
    async fn test_auto_scan_follows_setting() {
        let dir = tempdir().unwrap();
        let scanner = scanner().await;
        scanner
            .database
            .add_folder(&dir.path().to_string_lossy())
            .await
            .unwrap();
        scanner
            .database
            .add_folder(&dir.path().join("missing").to_string_lossy())
            .await
            .unwrap();

        let mut settings = UserSettings::default();
        assert!(scanner.apply_auto_scan(&settings).await.unwrap());
        assert_eq!(scanner.watched_folders(), vec![dir.path().to_path_buf()]);

        settings.auto_scan = false;
        assert!(!scanner.apply_auto_scan(&settings).await.unwrap());
        assert!(scanner.watched_folders().is_empty());
    }
}
