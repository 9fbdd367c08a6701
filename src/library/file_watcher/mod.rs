//! File system change detection using the `notify` crate.
//!
//! Scan folders are watched recursively. Raw events are filtered down to
//! supported audio files and forwarded as [`WatchEvent`]s; the
//! [`DebouncedEventProcessor`] folds them into [`ChangeBatch`]es for the
//! scanner.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    async_channel::Sender,
    notify::{
        Config, Error, Event, RecommendedWatcher,
        RecursiveMode::Recursive,
        Watcher,
        event::{EventKind, ModifyKind, RenameMode},
    },
    parking_lot::RwLock,
    tracing::{debug, error},
};

use crate::error::domain::LibraryError;

mod debouncer;

pub use debouncer::{ChangeBatch, DebouncedEventProcessor};

/// One audio file change seen by the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Created, or its contents were written.
    Changed(PathBuf),
    /// Deleted, or moved out of the watched tree.
    Removed(PathBuf),
    /// Moved within the watched tree.
    Renamed { from: PathBuf, to: PathBuf },
}

/// Audio file extensions the library accepts, compared case-insensitively.
pub const SUPPORTED_AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "aac", "m4a", "ogg", "wav"];

/// Checks if a path has a supported audio extension.
#[must_use]
pub fn is_supported_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|ext| {
            SUPPORTED_AUDIO_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(ext))
        })
}

/// Checks if any component below `root` starts with a dot.
fn is_hidden_below(path: &Path, root: Option<&Path>) -> bool {
    let relative = root
        .and_then(|root| path.strip_prefix(root).ok())
        .unwrap_or(path);
    relative.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
    })
}

/// File system watcher for scan folders.
pub struct FileWatcher {
    /// Internal notify watcher.
    watcher: RecommendedWatcher,
    /// Roots registered with the watcher.
    watched_paths: Arc<RwLock<HashSet<PathBuf>>>,
}

impl FileWatcher {
    /// Creates a watcher that sends filtered events to `event_sender`.
    ///
    /// Files below dot-directories of a watched root are dropped unless
    /// `include_hidden` is set.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the platform watcher cannot be initialized.
    pub fn new(
        event_sender: Sender<WatchEvent>,
        include_hidden: bool,
    ) -> Result<Self, LibraryError> {
        let watched_paths = Arc::new(RwLock::new(HashSet::new()));

        let roots = Arc::clone(&watched_paths);
        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, Error>| {
                let roots = roots.read();
                Self::handle_raw_event(res, &event_sender, &roots, include_hidden);
            },
            Config::default(),
        )
        .map_err(|e| LibraryError::InvalidData {
            reason: format!("Failed to create file watcher: {e}"),
        })?;

        Ok(Self {
            watcher,
            watched_paths,
        })
    }

    fn handle_raw_event(
        res: Result<Event, Error>,
        sender: &Sender<WatchEvent>,
        roots: &HashSet<PathBuf>,
        include_hidden: bool,
    ) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                error!("File system watcher error: {}", e);
                return;
            }
        };
        debug!("Raw file system event: {:?}", event);

        let accepted = |path: &Path| {
            let root = roots.iter().find(|root| path.starts_with(root));
            is_supported_audio_file(path)
                && (include_hidden || !is_hidden_below(path, root.map(PathBuf::as_path)))
        };

        if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind
            && let [from, to] = event.paths.as_slice()
        {
            let processed = match (accepted(from), accepted(to)) {
                (true, true) => Some(WatchEvent::Renamed {
                    from: from.clone(),
                    to: to.clone(),
                }),
                (true, false) => Some(WatchEvent::Removed(from.clone())),
                (false, true) => Some(WatchEvent::Changed(to.clone())),
                (false, false) => None,
            };
            if let Some(processed) = processed {
                let _ = sender.try_send(processed);
            }
            return;
        }

        for path in event.paths.iter().filter(|path| accepted(path)) {
            let processed = match event.kind {
                EventKind::Create(_)
                | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(RenameMode::To)) => {
                    WatchEvent::Changed(path.clone())
                }
                EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                    WatchEvent::Removed(path.clone())
                }
                _ => {
                    debug!("Ignoring event kind {:?} for path: {:?}", event.kind, path);
                    continue;
                }
            };
            let _ = sender.try_send(processed);
        }
    }

    /// Adds a directory to be watched recursively.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the directory cannot be watched.
    pub fn watch_directory<P: AsRef<Path>>(&mut self, path: P) -> Result<(), LibraryError> {
        let path = path.as_ref();

        self.watcher
            .watch(path, Recursive)
            .map_err(|e| LibraryError::InvalidData {
                reason: format!("Failed to watch directory {}: {e}", path.display()),
            })?;
        self.watched_paths.write().insert(path.to_path_buf());

        debug!("Started watching directory: {:?}", path);
        Ok(())
    }

    /// Stops watching a directory.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the directory cannot be unwatched.
    pub fn unwatch_directory<P: AsRef<Path>>(&mut self, path: P) -> Result<(), LibraryError> {
        let path = path.as_ref();

        self.watched_paths.write().remove(path);
        self.watcher
            .unwatch(path)
            .map_err(|e| LibraryError::InvalidData {
                reason: format!("Failed to unwatch directory {}: {e}", path.display()),
            })?;

        debug!("Stopped watching directory: {:?}", path);
        Ok(())
    }

    /// Gets the set of currently watched paths.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched_paths.read().iter().cloned().collect()
    }
}
