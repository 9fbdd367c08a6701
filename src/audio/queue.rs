//! Playback queue with shuffle and repeat.
//!
//! The queue keeps two orders: the play order the player sees, and the
//! order the songs were queued in, which shuffle restores when it is turned
//! off. Entries carry a queue-unique id so the same song can be queued more
//! than once and still be restored to its own place.

use std::{collections::HashMap, fmt};

use {
    rand::{Rng, seq::SliceRandom, thread_rng},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::library::models::Song;

/// Repeat behaviour at the end of a song or the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RepeatMode {
    /// Stop after the last song.
    #[default]
    Off,
    /// Start over after the last song.
    All,
    /// Repeat the current song.
    One,
}

impl RepeatMode {
    /// Next mode in the `Off → All → One → Off` cycle.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::All,
            Self::All => Self::One,
            Self::One => Self::Off,
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Off => "off",
            Self::All => "all",
            Self::One => "one",
        };
        f.write_str(label)
    }
}

/// One queued song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Queue-unique id, stable across reorders and shuffles.
    pub id: u64,
    /// The queued song.
    pub song: Song,
}

/// Read-only copy of the queue for observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Songs in play order.
    pub songs: Vec<Song>,
    /// Index of the current song.
    pub current_index: usize,
    /// Whether the play order is shuffled.
    pub shuffle_enabled: bool,
    /// Current repeat mode.
    pub repeat_mode: RepeatMode,
}

/// Ordered playback queue.
///
/// Indices passed to the mutating operations refer to the play order.
/// Out-of-range indices are ignored.
#[derive(Debug, Clone, Default)]
pub struct QueueManager {
    /// Entries in play order.
    entries: Vec<QueueEntry>,
    /// Entry ids in the order they were queued.
    original_order: Vec<u64>,
    /// Index of the current entry in `entries`.
    current_index: usize,
    shuffle_enabled: bool,
    repeat_mode: RepeatMode,
    next_id: u64,
}

impl QueueManager {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn make_entry(&mut self, song: Song) -> QueueEntry {
        let id = self.next_id;
        self.next_id += 1;
        QueueEntry { id, song }
    }

    /// Replaces the queue.
    ///
    /// The current index becomes `start` clamped to the queue, or 0 for an
    /// empty queue. The shuffle flag is left as it is.
    pub fn set_queue(&mut self, songs: Vec<Song>, start: usize) {
        self.entries = songs.into_iter().map(|song| self.make_entry(song)).collect();
        self.original_order = self.entries.iter().map(|entry| entry.id).collect();
        self.current_index = start.min(self.entries.len().saturating_sub(1));
        debug!(
            "Queue set with {} songs, starting at {}",
            self.entries.len(),
            self.current_index
        );
    }

    /// Entries in play order.
    #[must_use]
    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    /// Songs in play order.
    #[must_use]
    pub fn songs(&self) -> Vec<Song> {
        self.entries.iter().map(|entry| entry.song.clone()).collect()
    }

    /// Number of queued songs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the current song in play order.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// The current song, if any.
    #[must_use]
    pub fn current_song(&self) -> Option<&Song> {
        self.entries.get(self.current_index).map(|entry| &entry.song)
    }

    /// Whether the play order is shuffled.
    #[must_use]
    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle_enabled
    }

    /// Current repeat mode.
    #[must_use]
    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    /// Sets the current index, as reported by the player.
    ///
    /// Indices outside the queue are ignored.
    pub fn update_current_index(&mut self, index: usize) {
        if index < self.entries.len() {
            self.current_index = index;
        } else {
            debug!(
                "Ignoring current index {} for a queue of {}",
                index,
                self.entries.len()
            );
        }
    }

    /// Appends a song to the end of the queue.
    pub fn add_to_queue(&mut self, song: Song) {
        let entry = self.make_entry(song);
        self.original_order.push(entry.id);
        self.entries.push(entry);
    }

    /// Inserts a song right after the current one.
    ///
    /// # Returns
    ///
    /// The play-order index the song was inserted at.
    pub fn add_to_queue_next(&mut self, song: Song) -> usize {
        let insert_index = (self.current_index + 1).min(self.entries.len());
        let entry = self.make_entry(song);

        let original_index = self
            .entries
            .get(self.current_index)
            .and_then(|current| self.original_order.iter().position(|&id| id == current.id))
            .map_or(self.original_order.len(), |position| position + 1);
        self.original_order.insert(original_index, entry.id);
        self.entries.insert(insert_index, entry);

        insert_index
    }

    /// Removes the song at `index`.
    ///
    /// Removing a song before the current one keeps the current song
    /// current. Removing the current last song moves the index back to the
    /// new last song.
    pub fn remove_from_queue(&mut self, index: usize) -> Option<QueueEntry> {
        if index >= self.entries.len() {
            return None;
        }

        let removed = self.entries.remove(index);
        self.original_order.retain(|&id| id != removed.id);

        if index < self.current_index {
            self.current_index = self.current_index.saturating_sub(1);
        } else if index == self.current_index && self.current_index >= self.entries.len() {
            self.current_index = self.entries.len().saturating_sub(1);
        }

        Some(removed)
    }

    /// Empties the queue.
    pub fn clear_queue(&mut self) {
        self.entries.clear();
        self.original_order.clear();
        self.current_index = 0;
    }

    /// Moves the song at `from` to `to`.
    ///
    /// The current index follows the current song. While shuffle is off the
    /// queued order follows the move too; while it is on only the play
    /// order changes.
    ///
    /// # Returns
    ///
    /// `false` if the indices were equal or out of range.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        let len = self.entries.len();
        if from == to || from >= len || to >= len {
            return false;
        }

        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);

        let current = self.current_index;
        if current == from {
            self.current_index = to;
        } else if from < current && to >= current {
            self.current_index = current - 1;
        } else if from > current && to <= current {
            self.current_index = current + 1;
        }

        if !self.shuffle_enabled {
            self.original_order = self.entries.iter().map(|entry| entry.id).collect();
        }
        true
    }

    /// Toggles shuffle using the thread-local random generator.
    ///
    /// # Returns
    ///
    /// Whether shuffle is now enabled.
    pub fn toggle_shuffle(&mut self) -> bool {
        self.toggle_shuffle_with(&mut thread_rng())
    }

    /// Toggles shuffle using `rng` for the permutation.
    ///
    /// Turning shuffle on puts the current song first and the rest in
    /// random order, with the current index at 0. Turning it off restores
    /// the queued order and keeps the current song current.
    pub fn toggle_shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        self.shuffle_enabled = !self.shuffle_enabled;

        if self.shuffle_enabled {
            if self.current_index < self.entries.len() {
                let current = self.entries.remove(self.current_index);
                self.entries.shuffle(rng);
                self.entries.insert(0, current);
            } else {
                self.entries.shuffle(rng);
            }
            self.current_index = 0;
        } else {
            let current_id = self.entries.get(self.current_index).map(|entry| entry.id);
            self.restore_original_order();
            self.current_index = current_id
                .and_then(|id| self.entries.iter().position(|entry| entry.id == id))
                .unwrap_or(0);
        }

        debug!("Shuffle {}", if self.shuffle_enabled { "on" } else { "off" });
        self.shuffle_enabled
    }

    fn restore_original_order(&mut self) {
        let mut by_id: HashMap<u64, QueueEntry> = self
            .entries
            .drain(..)
            .map(|entry| (entry.id, entry))
            .collect();
        let mut restored: Vec<QueueEntry> = self
            .original_order
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        // Entries missing from the queued order keep their relative order at the end.
        if !by_id.is_empty() {
            let mut rest: Vec<QueueEntry> = by_id.into_values().collect();
            rest.sort_by_key(|entry| entry.id);
            self.original_order.extend(rest.iter().map(|entry| entry.id));
            restored.extend(rest);
        }
        self.entries = restored;
    }

    /// Advances the repeat mode.
    pub fn cycle_repeat_mode(&mut self) -> RepeatMode {
        self.repeat_mode = self.repeat_mode.next();
        self.repeat_mode
    }

    /// Sets the repeat mode directly.
    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
    }

    /// Up to `count` songs after the current one.
    #[must_use]
    pub fn up_next(&self, count: usize) -> Vec<&Song> {
        self.entries
            .iter()
            .skip(self.current_index + 1)
            .take(count)
            .map(|entry| &entry.song)
            .collect()
    }

    /// Copies the observable queue state.
    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            songs: self.songs(),
            current_index: self.current_index,
            shuffle_enabled: self.shuffle_enabled,
            repeat_mode: self.repeat_mode,
        }
    }
}
