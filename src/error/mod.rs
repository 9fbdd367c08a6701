//! Error handling built on `thiserror` and `anyhow`.
//!
//! Domain enums give callers something precise to match on, while the
//! operational helpers attach context and route failures into `tracing`.

pub mod domain;
pub mod operational;

pub use {
    domain::{EffectError, LibraryError, PlaybackError, PresetError},
    operational::{ErrorReporter, ResultExt},
};
