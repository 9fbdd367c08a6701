//! Playback system.
//!
//! The host player behind [`session::MediaSession`] decodes and outputs
//! audio. This module owns everything on top of it: the queue, keeping the
//! player in step with it, play counting, and the equalizer with its
//! effects and presets.

pub mod controller;
pub mod dsp;
pub mod effects;
pub mod eq_controller;
pub mod equalizer;
pub mod metadata;
pub mod queue;
pub mod service;
pub mod session;

#[cfg(test)]
mod controller_tests;
#[cfg(test)]
pub(crate) mod test_session;
