//! Tunables for folder watching.

use std::time::Duration;

/// Settings for the watch started by
/// [`LibraryScanner::start_watching`](super::LibraryScanner::start_watching).
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Quiet period after which collected changes are applied.
    pub debounce_delay: Duration,
    /// Report files below dot-directories of a scan folder.
    pub include_hidden: bool,
    /// Buffered watcher events before new ones are dropped.
    pub event_capacity: usize,
    /// Buffered change batches waiting for the database.
    pub batch_capacity: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            debounce_delay: Duration::from_millis(500),
            include_hidden: false,
            event_capacity: 1024,
            batch_capacity: 16,
        }
    }
}
