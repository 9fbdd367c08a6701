//! Shared application state with change notifications.

pub mod app_state;

pub use app_state::{AppState, AppStateEvent, PlaybackSnapshot};
