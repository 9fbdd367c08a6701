//! Device audio effects attached to an audio session.
//!
//! Hosts expose an equalizer, a bass boost and a virtualizer per audio
//! session. [`EffectFactory`] creates them; the equalizer manager owns the
//! returned handles. [`SoftwareEffects`] is a backend whose handles drive an
//! in-process [`EffectChain`] that the host runs on its output buffers.

use std::sync::Arc;

use {parking_lot::Mutex, tracing::debug};

use crate::{audio::dsp::EffectChain, error::domain::EffectError};

/// Multi-band equalizer attached to an audio session.
pub trait EqualizerEffect: Send {
    /// Number of bands the device provides.
    fn number_of_bands(&self) -> u16;

    /// Sets one band level in millibels.
    ///
    /// # Errors
    ///
    /// Returns `EffectError` if the device rejects the level or the effect
    /// was released.
    fn set_band_level(&mut self, band: u16, level_mb: i32) -> Result<(), EffectError>;

    /// Switches the effect on or off.
    ///
    /// # Errors
    ///
    /// Returns `EffectError` if the effect was released.
    fn set_enabled(&mut self, enabled: bool) -> Result<(), EffectError>;

    /// Frees the device effect. Later calls fail with `EffectError::Released`.
    ///
    /// # Errors
    ///
    /// Returns `EffectError` if the device fails to free the effect.
    fn release(&mut self) -> Result<(), EffectError>;
}

/// Effect with a single `0..=1000` strength, such as bass boost.
pub trait StrengthEffect: Send {
    /// Whether the device honours [`StrengthEffect::set_strength`].
    fn strength_supported(&self) -> bool;

    /// Sets the strength.
    ///
    /// # Errors
    ///
    /// Returns `EffectError` if the device rejects the strength or the
    /// effect was released.
    fn set_strength(&mut self, strength: i32) -> Result<(), EffectError>;

    /// Switches the effect on or off.
    ///
    /// # Errors
    ///
    /// Returns `EffectError` if the effect was released.
    fn set_enabled(&mut self, enabled: bool) -> Result<(), EffectError>;

    /// Frees the device effect.
    ///
    /// # Errors
    ///
    /// Returns `EffectError` if the device fails to free the effect.
    fn release(&mut self) -> Result<(), EffectError>;
}

/// Creates the device effects for an audio session.
pub trait EffectFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns `EffectError::CreationFailed` if the device has no equalizer
    /// for this session.
    fn create_equalizer(
        &self,
        audio_session_id: i32,
    ) -> Result<Box<dyn EqualizerEffect>, EffectError>;

    /// # Errors
    ///
    /// Returns `EffectError::CreationFailed` if the device has no bass boost
    /// for this session.
    fn create_bass_boost(
        &self,
        audio_session_id: i32,
    ) -> Result<Box<dyn StrengthEffect>, EffectError>;

    /// # Errors
    ///
    /// Returns `EffectError::CreationFailed` if the device has no
    /// virtualizer for this session.
    fn create_virtualizer(
        &self,
        audio_session_id: i32,
    ) -> Result<Box<dyn StrengthEffect>, EffectError>;
}

/// Effect backend running every effect in one shared [`EffectChain`].
///
/// The host feeds its output through [`SoftwareEffects::chain`]:
///
/// ```
/// use tapedeck::audio::effects::SoftwareEffects;
///
/// let effects = SoftwareEffects::new(48_000, 2);
/// let mut buffer = [0.1_f32, -0.1, 0.2, -0.2];
/// effects.chain().lock().process_interleaved(&mut buffer);
/// ```
#[derive(Clone)]
pub struct SoftwareEffects {
    chain: Arc<Mutex<EffectChain>>,
}

impl SoftwareEffects {
    /// Creates a backend with a neutral chain.
    #[must_use]
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            chain: Arc::new(Mutex::new(EffectChain::new(sample_rate, channels))),
        }
    }

    /// The chain the effect handles write to.
    pub fn chain(&self) -> &Arc<Mutex<EffectChain>> {
        &self.chain
    }
}

impl EffectFactory for SoftwareEffects {
    fn create_equalizer(
        &self,
        audio_session_id: i32,
    ) -> Result<Box<dyn EqualizerEffect>, EffectError> {
        debug!("Creating software equalizer for session {}", audio_session_id);
        Ok(Box::new(SoftwareEqualizer {
            chain: Some(Arc::clone(&self.chain)),
        }))
    }

    fn create_bass_boost(
        &self,
        audio_session_id: i32,
    ) -> Result<Box<dyn StrengthEffect>, EffectError> {
        debug!("Creating software bass boost for session {}", audio_session_id);
        Ok(Box::new(SoftwareStrength {
            chain: Some(Arc::clone(&self.chain)),
            kind: StrengthKind::BassBoost,
        }))
    }

    fn create_virtualizer(
        &self,
        audio_session_id: i32,
    ) -> Result<Box<dyn StrengthEffect>, EffectError> {
        debug!("Creating software virtualizer for session {}", audio_session_id);
        Ok(Box::new(SoftwareStrength {
            chain: Some(Arc::clone(&self.chain)),
            kind: StrengthKind::Virtualizer,
        }))
    }
}

/// Equalizer handle; `None` once released.
struct SoftwareEqualizer {
    chain: Option<Arc<Mutex<EffectChain>>>,
}

impl SoftwareEqualizer {
    fn chain(&self) -> Result<&Arc<Mutex<EffectChain>>, EffectError> {
        self.chain.as_ref().ok_or(EffectError::Released)
    }
}

impl EqualizerEffect for SoftwareEqualizer {
    fn number_of_bands(&self) -> u16 {
        5
    }

    fn set_band_level(&mut self, band: u16, level_mb: i32) -> Result<(), EffectError> {
        if self.chain()?.lock().set_band_level(usize::from(band), level_mb) {
            Ok(())
        } else {
            Err(EffectError::OperationFailed {
                reason: format!("no equalizer band {band}"),
            })
        }
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), EffectError> {
        self.chain()?.lock().set_equalizer_enabled(enabled);
        Ok(())
    }

    fn release(&mut self) -> Result<(), EffectError> {
        if let Some(chain) = self.chain.take() {
            chain.lock().set_equalizer_enabled(false);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum StrengthKind {
    BassBoost,
    Virtualizer,
}

struct SoftwareStrength {
    chain: Option<Arc<Mutex<EffectChain>>>,
    kind: StrengthKind,
}

impl SoftwareStrength {
    fn chain(&self) -> Result<&Arc<Mutex<EffectChain>>, EffectError> {
        self.chain.as_ref().ok_or(EffectError::Released)
    }

    fn apply_enabled(chain: &mut EffectChain, kind: StrengthKind, enabled: bool) {
        match kind {
            StrengthKind::BassBoost => chain.set_bass_boost_enabled(enabled),
            StrengthKind::Virtualizer => chain.set_virtualizer_enabled(enabled),
        }
    }
}

impl StrengthEffect for SoftwareStrength {
    fn strength_supported(&self) -> bool {
        true
    }

    fn set_strength(&mut self, strength: i32) -> Result<(), EffectError> {
        let mut chain = self.chain()?.lock();
        match self.kind {
            StrengthKind::BassBoost => chain.set_bass_boost_strength(strength),
            StrengthKind::Virtualizer => chain.set_virtualizer_strength(strength),
        }
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), EffectError> {
        let kind = self.kind;
        Self::apply_enabled(&mut self.chain()?.lock(), kind, enabled);
        Ok(())
    }

    fn release(&mut self) -> Result<(), EffectError> {
        if let Some(chain) = self.chain.take() {
            Self::apply_enabled(&mut chain.lock(), self.kind, false);
        }
        Ok(())
    }
}
