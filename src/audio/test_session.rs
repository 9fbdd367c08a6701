//! In-memory media session used by the playback tests.

use {async_channel::Sender, parking_lot::Mutex};

use crate::audio::{
    queue::RepeatMode,
    session::{MediaItem, MediaSession, SessionEvent, TransitionReason},
};

#[derive(Debug, Default)]
pub struct FakeSessionState {
    pub items: Vec<MediaItem>,
    pub index: usize,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub playing: bool,
    pub prepared: bool,
    pub repeat_mode: RepeatMode,
    pub calls: Vec<String>,
}

/// Behaves like a minimal player and optionally reports its own callbacks.
pub struct FakeSession {
    pub state: Mutex<FakeSessionState>,
    events: Option<Sender<SessionEvent>>,
    session_id: i32,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeSessionState::default()),
            events: None,
            session_id: 0,
        }
    }

    pub fn with_events(events: Sender<SessionEvent>, session_id: i32) -> Self {
        Self {
            state: Mutex::new(FakeSessionState::default()),
            events: Some(events),
            session_id,
        }
    }

    pub fn item_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .items
            .iter()
            .map(|item| item.media_id.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            let _ = events.try_send(event);
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.state.lock().calls.push(call.into());
    }

    /// Ends the current item the way a player does on its own, honouring
    /// the repeat mode.
    pub fn finish_current(&self) {
        let reason = {
            let mut state = self.state.lock();
            state.position_ms = 0;
            let last = state.items.len().saturating_sub(1);
            let mode = state.repeat_mode;
            match mode {
                RepeatMode::One => TransitionReason::Repeat,
                _ if state.index < last => {
                    state.index += 1;
                    TransitionReason::Auto
                }
                RepeatMode::All if last == 0 => TransitionReason::Repeat,
                RepeatMode::All => {
                    state.index = 0;
                    TransitionReason::Auto
                }
                RepeatMode::Off => {
                    drop(state);
                    self.set_playing(false);
                    return;
                }
            }
        };
        self.transition(reason);
    }

    fn transition(&self, reason: TransitionReason) {
        let media_id = {
            let state = self.state.lock();
            state.items.get(state.index).map(|item| item.media_id.clone())
        };
        self.emit(SessionEvent::MediaItemTransition { media_id, reason });
    }

    fn set_playing(&self, playing: bool) {
        let changed = {
            let mut state = self.state.lock();
            let changed = state.playing != playing;
            state.playing = playing;
            changed
        };
        if changed {
            self.emit(SessionEvent::IsPlayingChanged(playing));
        }
    }
}

impl MediaSession for FakeSession {
    fn set_media_items(&self, items: Vec<MediaItem>, start_index: usize, start_position_ms: u64) {
        self.record(format!("set_media_items({start_index}, {start_position_ms})"));
        {
            let mut state = self.state.lock();
            state.items = items;
            state.index = start_index;
            state.position_ms = start_position_ms;
        }
        self.transition(TransitionReason::PlaylistChanged);
    }

    fn add_media_item(&self, item: MediaItem) {
        self.record("add_media_item");
        self.state.lock().items.push(item);
    }

    fn insert_media_item(&self, index: usize, item: MediaItem) {
        self.record(format!("insert_media_item({index})"));
        let mut state = self.state.lock();
        let index = index.min(state.items.len());
        state.items.insert(index, item);
        if index <= state.index && state.items.len() > 1 {
            state.index += 1;
        }
    }

    fn remove_media_item(&self, index: usize) {
        self.record(format!("remove_media_item({index})"));
        let mut state = self.state.lock();
        if index < state.items.len() {
            state.items.remove(index);
            if index < state.index {
                state.index -= 1;
            }
        }
    }

    fn move_media_item(&self, from: usize, to: usize) {
        self.record(format!("move_media_item({from}, {to})"));
        let mut state = self.state.lock();
        if from < state.items.len() && to < state.items.len() {
            let item = state.items.remove(from);
            state.items.insert(to, item);
        }
    }

    fn clear_media_items(&self) {
        self.record("clear_media_items");
        let mut state = self.state.lock();
        state.items.clear();
        state.index = 0;
    }

    fn prepare(&self) {
        self.record("prepare");
        self.state.lock().prepared = true;
    }

    fn play(&self) {
        self.record("play");
        self.set_playing(true);
    }

    fn pause(&self) {
        self.record("pause");
        self.set_playing(false);
    }

    fn seek_to(&self, position_ms: u64) {
        self.record(format!("seek_to({position_ms})"));
        self.state.lock().position_ms = position_ms;
    }

    fn seek_to_media_item(&self, index: usize, position_ms: u64) {
        self.record(format!("seek_to_media_item({index}, {position_ms})"));
        {
            let mut state = self.state.lock();
            state.index = index;
            state.position_ms = position_ms;
        }
        self.transition(TransitionReason::Seek);
    }

    fn seek_to_next(&self) {
        self.record("seek_to_next");
        let moved = {
            let mut state = self.state.lock();
            if state.index + 1 < state.items.len() {
                state.index += 1;
                state.position_ms = 0;
                true
            } else {
                false
            }
        };
        if moved {
            self.transition(TransitionReason::Seek);
        }
    }

    fn seek_to_previous(&self) {
        self.record("seek_to_previous");
        let moved = {
            let mut state = self.state.lock();
            state.position_ms = 0;
            if state.index > 0 {
                state.index -= 1;
                true
            } else {
                false
            }
        };
        if moved {
            self.transition(TransitionReason::Seek);
        }
    }

    fn set_repeat_mode(&self, mode: RepeatMode) {
        self.record(format!("set_repeat_mode({mode})"));
        self.state.lock().repeat_mode = mode;
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn current_media_item_index(&self) -> usize {
        self.state.lock().index
    }

    fn current_position_ms(&self) -> u64 {
        self.state.lock().position_ms
    }

    fn duration_ms(&self) -> Option<u64> {
        self.state.lock().duration_ms
    }

    fn audio_session_id(&self) -> i32 {
        self.session_id
    }
}
