//! Equalizer state machine.
//!
//! [`EqualizerManager`] holds the desired effect settings and mirrors them
//! onto the device effects of the current audio session. Settings change
//! even while no effect is attached; attaching applies them in one go.

use std::sync::Arc;

use {
    parking_lot::Mutex,
    serde::{Deserialize, Serialize},
    tokio::sync::watch,
    tracing::{debug, error, warn},
};

use crate::{
    audio::effects::{EffectFactory, EqualizerEffect, StrengthEffect},
    error::domain::EffectError,
    library::models::EqPreset,
};

pub const BAND_60HZ: usize = 0;
pub const BAND_250HZ: usize = 1;
pub const BAND_1KHZ: usize = 2;
pub const BAND_4KHZ: usize = 3;
pub const BAND_16KHZ: usize = 4;

/// Number of equalizer bands.
pub const BAND_COUNT: usize = 5;

/// Lowest band level in millibels.
pub const MIN_LEVEL_MB: i32 = -1200;
/// Highest band level in millibels.
pub const MAX_LEVEL_MB: i32 = 1200;

/// Lowest bass boost or virtualizer strength.
pub const MIN_STRENGTH: i32 = 0;
/// Highest bass boost or virtualizer strength.
pub const MAX_STRENGTH: i32 = 1000;

/// Bass boost in dB at [`MAX_STRENGTH`].
pub const MAX_BASS_BOOST_DB: f32 = 15.0;

/// Desired effect settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EqualizerState {
    pub is_enabled: bool,
    /// Band levels in millibels.
    pub band_60hz: i32,
    pub band_250hz: i32,
    pub band_1khz: i32,
    pub band_4khz: i32,
    pub band_16khz: i32,
    /// Strength in `0..=1000`.
    pub bass_boost: i32,
    /// Strength in `0..=1000`.
    pub virtualizer: i32,
}

impl EqualizerState {
    /// Band levels from lowest to highest frequency.
    #[must_use]
    pub fn bands(&self) -> [i32; BAND_COUNT] {
        [
            self.band_60hz,
            self.band_250hz,
            self.band_1khz,
            self.band_4khz,
            self.band_16khz,
        ]
    }

    fn band_mut(&mut self, band: usize) -> Option<&mut i32> {
        match band {
            BAND_60HZ => Some(&mut self.band_60hz),
            BAND_250HZ => Some(&mut self.band_250hz),
            BAND_1KHZ => Some(&mut self.band_1khz),
            BAND_4KHZ => Some(&mut self.band_4khz),
            BAND_16KHZ => Some(&mut self.band_16khz),
            _ => None,
        }
    }
}

/// Device effects of the attached session; each is `None` until created.
#[derive(Default)]
struct Effects {
    equalizer: Option<Box<dyn EqualizerEffect>>,
    bass_boost: Option<Box<dyn StrengthEffect>>,
    virtualizer: Option<Box<dyn StrengthEffect>>,
}

impl Effects {
    fn apply(&mut self, state: &EqualizerState) -> Result<(), EffectError> {
        if let Some(equalizer) = &mut self.equalizer {
            equalizer.set_enabled(state.is_enabled)?;
            for (band, level) in (0u16..).zip(state.bands()) {
                equalizer.set_band_level(band, level)?;
            }
        }
        if let Some(bass_boost) = &mut self.bass_boost {
            bass_boost.set_enabled(state.is_enabled)?;
            bass_boost.set_strength(state.bass_boost)?;
        }
        if let Some(virtualizer) = &mut self.virtualizer {
            virtualizer.set_enabled(state.is_enabled)?;
            virtualizer.set_strength(state.virtualizer)?;
        }
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), EffectError> {
        if let Some(equalizer) = &mut self.equalizer {
            equalizer.set_enabled(enabled)?;
        }
        if let Some(bass_boost) = &mut self.bass_boost {
            bass_boost.set_enabled(enabled)?;
        }
        if let Some(virtualizer) = &mut self.virtualizer {
            virtualizer.set_enabled(enabled)?;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), EffectError> {
        let equalizer = self.equalizer.take().map(|mut e| e.release());
        let bass_boost = self.bass_boost.take().map(|mut e| e.release());
        let virtualizer = self.virtualizer.take().map(|mut e| e.release());

        [equalizer, bass_boost, virtualizer]
            .into_iter()
            .flatten()
            .collect::<Result<Vec<()>, _>>()
            .map(|_| ())
    }
}

struct Attachment {
    audio_session_id: i32,
    effects: Effects,
}

/// Owns the device effects of one audio session.
pub struct EqualizerManager {
    factory: Arc<dyn EffectFactory>,
    attachment: Mutex<Attachment>,
    state: watch::Sender<EqualizerState>,
    available: watch::Sender<bool>,
}

impl EqualizerManager {
    /// Creates a detached manager with neutral settings.
    pub fn new(factory: Arc<dyn EffectFactory>) -> Self {
        let (state, _) = watch::channel(EqualizerState::default());
        let (available, _) = watch::channel(false);
        Self {
            factory,
            attachment: Mutex::new(Attachment {
                audio_session_id: 0,
                effects: Effects::default(),
            }),
            state,
            available,
        }
    }

    /// Current settings.
    pub fn state(&self) -> EqualizerState {
        *self.state.borrow()
    }

    /// Follows setting changes.
    pub fn subscribe(&self) -> watch::Receiver<EqualizerState> {
        self.state.subscribe()
    }

    /// Whether device effects are attached.
    pub fn is_available(&self) -> bool {
        *self.available.borrow()
    }

    /// Follows effect availability.
    pub fn subscribe_available(&self) -> watch::Receiver<bool> {
        self.available.subscribe()
    }

    /// The attached audio session, 0 when detached.
    pub fn audio_session_id(&self) -> i32 {
        self.attachment.lock().audio_session_id
    }

    /// Attaches effects to `audio_session_id` and applies the current settings.
    ///
    /// Session 0 and the already attached session are ignored. If any effect
    /// cannot be created, everything is released and effects stay
    /// unavailable.
    pub fn attach_to_audio_session(&self, audio_session_id: i32) {
        let mut attachment = self.attachment.lock();
        if audio_session_id == 0 || audio_session_id == attachment.audio_session_id {
            return;
        }

        debug!("Attaching to audio session: {}", audio_session_id);
        self.release_locked(&mut attachment);
        attachment.audio_session_id = audio_session_id;

        if let Err(e) = self.create_effects(&mut attachment.effects, audio_session_id) {
            error!("Failed to initialize audio effects: {}", e);
            self.release_locked(&mut attachment);
            return;
        }

        self.available.send_replace(true);
        if let Err(e) = attachment.effects.apply(&self.state()) {
            error!("Failed to apply current state: {}", e);
        }
    }

    fn create_effects(&self, effects: &mut Effects, audio_session_id: i32) -> Result<(), EffectError> {
        let equalizer = self.factory.create_equalizer(audio_session_id)?;
        let bands = equalizer.number_of_bands();
        if usize::from(bands) >= BAND_COUNT {
            debug!("Equalizer initialized with {} bands", bands);
        } else {
            warn!("Equalizer has only {} bands, expected {}", bands, BAND_COUNT);
        }
        effects.equalizer = Some(equalizer);

        let bass_boost = self.factory.create_bass_boost(audio_session_id)?;
        if !bass_boost.strength_supported() {
            warn!("Bass boost strength not supported on this device");
        }
        effects.bass_boost = Some(bass_boost);

        let virtualizer = self.factory.create_virtualizer(audio_session_id)?;
        if !virtualizer.strength_supported() {
            warn!("Virtualizer strength not supported on this device");
        }
        effects.virtualizer = Some(virtualizer);

        Ok(())
    }

    /// Switches every effect on or off.
    pub fn set_enabled(&self, enabled: bool) {
        self.state.send_modify(|state| state.is_enabled = enabled);

        if let Err(e) = self.attachment.lock().effects.set_enabled(enabled) {
            error!("Failed to set enabled state: {}", e);
        }
    }

    /// Sets one band, clamped to `MIN_LEVEL_MB..=MAX_LEVEL_MB`.
    ///
    /// An unknown band leaves the settings unchanged; the level is still
    /// forwarded to the device, which rejects it.
    pub fn set_band_level(&self, band: usize, level_mb: i32) {
        let level = level_mb.clamp(MIN_LEVEL_MB, MAX_LEVEL_MB);
        self.state.send_if_modified(|state| match state.band_mut(band) {
            Some(slot) => {
                *slot = level;
                true
            }
            None => false,
        });

        let mut attachment = self.attachment.lock();
        if let Some(equalizer) = &mut attachment.effects.equalizer {
            let result = u16::try_from(band)
                .map_err(|_| EffectError::OperationFailed {
                    reason: format!("no equalizer band {band}"),
                })
                .and_then(|band| equalizer.set_band_level(band, level));
            if let Err(e) = result {
                error!("Failed to set band {} level: {}", band, e);
            }
        }
    }

    pub fn set_band_60hz(&self, level_mb: i32) {
        self.set_band_level(BAND_60HZ, level_mb);
    }

    pub fn set_band_250hz(&self, level_mb: i32) {
        self.set_band_level(BAND_250HZ, level_mb);
    }

    pub fn set_band_1khz(&self, level_mb: i32) {
        self.set_band_level(BAND_1KHZ, level_mb);
    }

    pub fn set_band_4khz(&self, level_mb: i32) {
        self.set_band_level(BAND_4KHZ, level_mb);
    }

    pub fn set_band_16khz(&self, level_mb: i32) {
        self.set_band_level(BAND_16KHZ, level_mb);
    }

    /// Sets the bass boost strength, clamped to `MIN_STRENGTH..=MAX_STRENGTH`.
    pub fn set_bass_boost_strength(&self, strength: i32) {
        let strength = strength.clamp(MIN_STRENGTH, MAX_STRENGTH);
        self.state.send_modify(|state| state.bass_boost = strength);

        let mut attachment = self.attachment.lock();
        if let Some(bass_boost) = &mut attachment.effects.bass_boost
            && let Err(e) = bass_boost.set_strength(strength)
        {
            error!("Failed to set bass boost strength: {}", e);
        }
    }

    /// Sets the virtualizer strength, clamped to `MIN_STRENGTH..=MAX_STRENGTH`.
    pub fn set_virtualizer_strength(&self, strength: i32) {
        let strength = strength.clamp(MIN_STRENGTH, MAX_STRENGTH);
        self.state.send_modify(|state| state.virtualizer = strength);

        let mut attachment = self.attachment.lock();
        if let Some(virtualizer) = &mut attachment.effects.virtualizer
            && let Err(e) = virtualizer.set_strength(strength)
        {
            error!("Failed to set virtualizer strength: {}", e);
        }
    }

    /// Applies the levels of a stored preset. The enabled flag is untouched.
    pub fn apply_preset(&self, preset: &EqPreset) {
        for (band, level) in preset.bands().into_iter().enumerate() {
            self.set_band_level(band, level);
        }
        self.set_bass_boost_strength(preset.bass_boost);
        self.set_virtualizer_strength(preset.virtualizer);
    }

    /// Zeroes every band and strength.
    pub fn reset(&self) {
        self.apply_preset(&EqPreset::flat());
    }

    /// Releases the device effects and detaches from the session.
    pub fn release(&self) {
        let mut attachment = self.attachment.lock();
        self.release_locked(&mut attachment);
    }

    fn release_locked(&self, attachment: &mut Attachment) {
        debug!("Releasing audio effects");
        if let Err(e) = attachment.effects.release() {
            error!("Error releasing audio effects: {}", e);
        }
        attachment.audio_session_id = 0;
        self.available.send_replace(false);
    }
}

/// `dB` to millibels, rounded.
#[must_use]
pub fn db_to_millibels(db: f32) -> i32 {
    (db * 100.0).round() as i32
}

#[must_use]
pub fn millibels_to_db(level_mb: i32) -> f32 {
    level_mb as f32 / 100.0
}

/// Bass boost in `0..=15` dB to a strength, clamped to `0..=1000`.
#[must_use]
pub fn db_to_bass_boost_strength(db: f32) -> i32 {
    ((db / MAX_BASS_BOOST_DB) * MAX_STRENGTH as f32)
        .round()
        .clamp(MIN_STRENGTH as f32, MAX_STRENGTH as f32) as i32
}

#[must_use]
pub fn bass_boost_strength_to_db(strength: i32) -> f32 {
    strength as f32 / MAX_STRENGTH as f32 * MAX_BASS_BOOST_DB
}

/// Virtualizer percentage to a strength, clamped to `0..=1000`.
#[must_use]
pub fn percent_to_virtualizer_strength(percent: f32) -> i32 {
    ((percent / 100.0) * MAX_STRENGTH as f32)
        .round()
        .clamp(MIN_STRENGTH as f32, MAX_STRENGTH as f32) as i32
}

#[must_use]
pub fn virtualizer_strength_to_percent(strength: i32) -> f32 {
    strength as f32 / MAX_STRENGTH as f32 * 100.0
}
