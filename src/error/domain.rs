//! Domain-specific error types using `thiserror`.
//!
//! This module defines the error enums for the library, playback,
//! audio-effect and preset domains of the player.

use {sqlx::Error as SqlxError, thiserror::Error};

use crate::{config::settings::SettingsError, library::schema::SchemaError};

/// Library-related errors.
#[derive(Error, Debug)]
pub enum LibraryError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),
    /// Schema initialization error.
    #[error("Schema error: {0}")]
    SchemaError(#[from] SchemaError),
    /// Invalid file path, name or metadata.
    #[error("Invalid data: {reason}")]
    InvalidData { reason: String },
    /// Record not found.
    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: i64 },
}

/// Playback and queue errors.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// A queue position outside the current queue.
    #[error("Queue index {index} out of range (queue length {len})")]
    IndexOutOfRange { index: usize, len: usize },
    /// The operation needs at least one song.
    #[error("Queue is empty")]
    EmptyQueue,
    /// Library lookup failed while building a queue.
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

/// Errors raised by audio effect backends.
#[derive(Error, Debug)]
pub enum EffectError {
    /// The backend could not create an effect for the audio session.
    #[error("Failed to create {effect} for audio session {session_id}: {reason}")]
    CreationFailed {
        effect: &'static str,
        session_id: i32,
        reason: String,
    },
    /// A parameter change was rejected by the backend.
    #[error("Effect operation failed: {reason}")]
    OperationFailed { reason: String },
    /// The effect has already been released.
    #[error("Effect already released")]
    Released,
}

/// Equalizer preset selection errors.
#[derive(Error, Debug)]
pub enum PresetError {
    /// Preset lookup or storage failed.
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
    /// The selection could not be persisted.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    /// Built-in presets cannot be deleted or overwritten.
    #[error("Preset '{name}' is built in")]
    BuiltIn { name: String },
}
