//! Real-time effect chain used by the software effect backend.
//!
//! Five peaking filters at fixed centre frequencies, a low-shelf bass boost
//! and a mid/side stereo widener, applied in that order to interleaved
//! `f32` samples. Filter coefficients follow the RBJ audio EQ cookbook.

use std::f32::consts::PI;

/// Centre frequencies of the five equalizer bands.
pub const BAND_FREQUENCIES_HZ: [f32; 5] = [60.0, 250.0, 1_000.0, 4_000.0, 16_000.0];

/// Bandwidth of each peaking band.
const BAND_Q: f32 = 1.0;

/// Corner frequency of the bass boost shelf.
const BASS_SHELF_HZ: f32 = 100.0;

/// Shelf gain at full bass boost strength.
pub const MAX_BASS_BOOST_DB: f32 = 15.0;

/// Side gain at full virtualizer strength.
const MAX_SIDE_GAIN: f32 = 2.0;

/// Strength scale shared by bass boost and virtualizer.
const STRENGTH_SCALE: f32 = 1000.0;

/// Normalized biquad coefficients (`a0 == 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Coefficients {
    const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    fn normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Angular frequency, kept below Nyquist.
    fn omega(sample_rate: f32, frequency: f32) -> f32 {
        2.0 * PI * frequency.min(sample_rate * 0.45) / sample_rate
    }

    fn peaking(sample_rate: f32, frequency: f32, q: f32, gain_db: f32) -> Self {
        if gain_db == 0.0 || sample_rate < 1.0 {
            return Self::IDENTITY;
        }

        let a = 10.0_f32.powf(gain_db / 40.0);
        let omega = Self::omega(sample_rate, frequency);
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * q);

        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos_omega,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_omega,
            1.0 - alpha / a,
        )
    }

    /// Low shelf with a shelf slope of 1.
    fn low_shelf(sample_rate: f32, frequency: f32, gain_db: f32) -> Self {
        if gain_db == 0.0 || sample_rate < 1.0 {
            return Self::IDENTITY;
        }

        let a = 10.0_f32.powf(gain_db / 40.0);
        let omega = Self::omega(sample_rate, frequency);
        let cos_omega = omega.cos();
        let alpha = omega.sin() / 2.0 * 2.0_f32.sqrt();
        let beta = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) - (a - 1.0) * cos_omega + beta),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega),
            a * ((a + 1.0) - (a - 1.0) * cos_omega - beta),
            (a + 1.0) + (a - 1.0) * cos_omega + beta,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega),
            (a + 1.0) + (a - 1.0) * cos_omega - beta,
        )
    }
}

/// Per-channel filter history: `x[n-1]`, `x[n-2]`, `y[n-1]`, `y[n-2]`.
type History = [f32; 4];

/// Direct form I biquad with independent history per channel.
#[derive(Debug, Clone)]
struct Biquad {
    coefficients: Coefficients,
    history: Vec<History>,
}

impl Biquad {
    fn new(channels: usize) -> Self {
        Self {
            coefficients: Coefficients::IDENTITY,
            history: vec![[0.0; 4]; channels],
        }
    }

    fn is_identity(&self) -> bool {
        self.coefficients == Coefficients::IDENTITY
    }

    #[inline]
    fn process(&mut self, channel: usize, input: f32) -> f32 {
        let c = self.coefficients;
        let [x1, x2, y1, y2] = self.history[channel];

        let mut output = c.b0 * input + c.b1 * x1 + c.b2 * x2 - c.a1 * y1 - c.a2 * y2;
        // Denormal flush.
        if output.abs() < 1e-15 {
            output = 0.0;
        }

        self.history[channel] = [input, x1, output, y1];
        output
    }

    fn reset(&mut self) {
        self.history.iter_mut().for_each(|h| *h = [0.0; 4]);
    }
}

/// Equalizer, bass boost and virtualizer applied to one audio stream.
///
/// Parameters use the same units as the device effects: band levels in
/// millibels, strengths in `0..=1000`. Each stage can be switched off on
/// its own and is skipped entirely while it is neutral.
#[derive(Debug, Clone)]
pub struct EffectChain {
    sample_rate: f32,
    channels: usize,
    equalizer_enabled: bool,
    band_levels_mb: [i32; 5],
    bands: [Biquad; 5],
    bass_boost_enabled: bool,
    bass_boost_strength: i32,
    bass_shelf: Biquad,
    virtualizer_enabled: bool,
    virtualizer_strength: i32,
}

impl EffectChain {
    /// Creates a neutral chain for `channels` interleaved channels.
    #[must_use]
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            sample_rate: sample_rate as f32,
            channels,
            equalizer_enabled: false,
            band_levels_mb: [0; 5],
            bands: std::array::from_fn(|_| Biquad::new(channels)),
            bass_boost_enabled: false,
            bass_boost_strength: 0,
            bass_shelf: Biquad::new(channels),
            virtualizer_enabled: false,
            virtualizer_strength: 0,
        }
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate as u32
    }

    /// Number of interleaved channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Recomputes every filter for a new sample rate and clears history.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate as f32;
        for band in 0..self.bands.len() {
            self.update_band(band);
        }
        self.update_bass_shelf();
        self.reset();
    }

    fn update_band(&mut self, band: usize) {
        let gain_db = self.band_levels_mb[band] as f32 / 100.0;
        self.bands[band].coefficients = Coefficients::peaking(
            self.sample_rate,
            BAND_FREQUENCIES_HZ[band],
            BAND_Q,
            gain_db,
        );
    }

    fn update_bass_shelf(&mut self) {
        let gain_db = self.bass_boost_strength as f32 / STRENGTH_SCALE * MAX_BASS_BOOST_DB;
        self.bass_shelf.coefficients =
            Coefficients::low_shelf(self.sample_rate, BASS_SHELF_HZ, gain_db);
    }

    /// Switches the five bands on or off.
    pub fn set_equalizer_enabled(&mut self, enabled: bool) {
        self.equalizer_enabled = enabled;
    }

    /// Sets one band level in millibels.
    ///
    /// # Returns
    ///
    /// `false` for a band index outside `0..5`.
    pub fn set_band_level(&mut self, band: usize, level_mb: i32) -> bool {
        let Some(level) = self.band_levels_mb.get_mut(band) else {
            return false;
        };
        *level = level_mb;
        self.update_band(band);
        true
    }

    /// Band level in millibels.
    pub fn band_level(&self, band: usize) -> Option<i32> {
        self.band_levels_mb.get(band).copied()
    }

    pub fn set_bass_boost_enabled(&mut self, enabled: bool) {
        self.bass_boost_enabled = enabled;
    }

    /// Sets the bass boost strength, clamped to `0..=1000`.
    pub fn set_bass_boost_strength(&mut self, strength: i32) {
        self.bass_boost_strength = strength.clamp(0, STRENGTH_SCALE as i32);
        self.update_bass_shelf();
    }

    pub fn bass_boost_strength(&self) -> i32 {
        self.bass_boost_strength
    }

    pub fn set_virtualizer_enabled(&mut self, enabled: bool) {
        self.virtualizer_enabled = enabled;
    }

    /// Sets the virtualizer strength, clamped to `0..=1000`.
    pub fn set_virtualizer_strength(&mut self, strength: i32) {
        self.virtualizer_strength = strength.clamp(0, STRENGTH_SCALE as i32);
    }

    pub fn virtualizer_strength(&self) -> i32 {
        self.virtualizer_strength
    }

    /// Whether processing leaves samples untouched.
    pub fn is_bypassed(&self) -> bool {
        let equalizer_idle =
            !self.equalizer_enabled || self.bands.iter().all(Biquad::is_identity);
        let bass_idle = !self.bass_boost_enabled || self.bass_shelf.is_identity();
        equalizer_idle && bass_idle && self.side_gain().is_none()
    }

    /// Side gain of the widener, `None` while it has no effect.
    fn side_gain(&self) -> Option<f32> {
        if !self.virtualizer_enabled || self.virtualizer_strength == 0 || self.channels != 2 {
            return None;
        }
        let amount = self.virtualizer_strength as f32 / STRENGTH_SCALE;
        Some(1.0 + amount * (MAX_SIDE_GAIN - 1.0))
    }

    /// Processes interleaved samples in place.
    ///
    /// A trailing partial frame is left untouched. Does not allocate.
    pub fn process_interleaved(&mut self, samples: &mut [f32]) {
        if self.is_bypassed() {
            return;
        }

        let run_equalizer = self.equalizer_enabled;
        let run_bass = self.bass_boost_enabled && !self.bass_shelf.is_identity();
        let side_gain = self.side_gain();

        for frame in samples.chunks_exact_mut(self.channels) {
            for (channel, sample) in frame.iter_mut().enumerate() {
                let mut value = *sample;
                if run_equalizer {
                    for band in &mut self.bands {
                        if !band.is_identity() {
                            value = band.process(channel, value);
                        }
                    }
                }
                if run_bass {
                    value = self.bass_shelf.process(channel, value);
                }
                *sample = value;
            }

            if let Some(side_gain) = side_gain {
                let mid = (frame[0] + frame[1]) * 0.5;
                let side = (frame[0] - frame[1]) * 0.5 * side_gain;
                frame[0] = mid + side;
                frame[1] = mid - side;
            }
        }
    }

    /// Clears filter history, e.g. after a seek.
    pub fn reset(&mut self) {
        self.bands.iter_mut().for_each(Biquad::reset);
        self.bass_shelf.reset();
    }
}
