//! Folds bursts of watcher events into one batch per quiet period.

use std::{collections::HashMap, mem::take, path::PathBuf, time::Duration};

use {
    async_channel::{Receiver, Sender},
    tokio::time::timeout,
    tracing::debug,
};

use crate::library::file_watcher::WatchEvent;

/// Net effect of one quiet period, each list sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    /// Files to insert or refresh.
    pub changed: Vec<PathBuf>,
    /// Files to drop from the library.
    pub removed: Vec<PathBuf>,
    /// Files to move, as `(from, to)`.
    pub renamed: Vec<(PathBuf, PathBuf)>,
}

impl ChangeBatch {
    /// Returns `true` if the batch carries nothing.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty() && self.renamed.is_empty()
    }
}

/// Latest known fate of one path inside a window.
#[derive(Debug, Clone, PartialEq)]
enum Pending {
    Changed,
    Removed,
    MovedFrom(PathBuf),
}

/// Collects [`WatchEvent`]s until the watched folders have been quiet for
/// `delay`, then emits one [`ChangeBatch`].
///
/// Later events for a path supersede earlier ones: a file that is written and
/// then deleted in the same window is only reported as removed.
pub struct DebouncedEventProcessor {
    events: Receiver<WatchEvent>,
    batches: Sender<ChangeBatch>,
    delay: Duration,
    pending: HashMap<PathBuf, Pending>,
}

impl DebouncedEventProcessor {
    pub fn new(events: Receiver<WatchEvent>, batches: Sender<ChangeBatch>, delay: Duration) -> Self {
        Self {
            events,
            batches,
            delay,
            pending: HashMap::new(),
        }
    }

    /// Runs until the event channel closes, flushing what is pending.
    pub async fn start_processing(mut self) {
        loop {
            let next = if self.pending.is_empty() {
                self.events.recv().await.ok()
            } else {
                match timeout(self.delay, self.events.recv()).await {
                    Ok(received) => received.ok(),
                    Err(_) => {
                        if !self.flush().await {
                            return;
                        }
                        continue;
                    }
                }
            };

            let Some(event) = next else {
                self.flush().await;
                debug!("File system event channel closed");
                return;
            };
            self.record(event);
        }
    }

    fn record(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::Changed(path) => {
                self.pending.insert(path, Pending::Changed);
            }
            WatchEvent::Removed(path) => {
                self.pending.insert(path, Pending::Removed);
            }
            WatchEvent::Renamed { from, to } => {
                // Created then moved inside one window: just a new file.
                let fate = match self.pending.remove(&from) {
                    Some(Pending::Changed) => Pending::Changed,
                    Some(Pending::MovedFrom(origin)) => Pending::MovedFrom(origin),
                    Some(Pending::Removed) | None => Pending::MovedFrom(from),
                };
                self.pending.insert(to, fate);
            }
        }
    }

    fn drain(&mut self) -> ChangeBatch {
        let mut batch = ChangeBatch::default();
        for (path, fate) in take(&mut self.pending) {
            match fate {
                Pending::Changed => batch.changed.push(path),
                Pending::Removed => batch.removed.push(path),
                Pending::MovedFrom(from) => batch.renamed.push((from, path)),
            }
        }
        batch.changed.sort();
        batch.removed.sort();
        batch.renamed.sort();
        batch
    }

    /// Sends the pending batch. Returns `false` once the consumer is gone.
    async fn flush(&mut self) -> bool {
        let batch = self.drain();
        if batch.is_empty() {
            return true;
        }
        if self.batches.send(batch).await.is_err() {
            debug!("Change batch consumer dropped");
            return false;
        }
        true
    }
}
