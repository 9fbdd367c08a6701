//! Preset selection on top of the equalizer manager.
//!
//! Tracks which stored preset is selected and whether the live settings
//! still match it. Values cross this boundary in display units: dB for
//! bands and bass boost, percent for the virtualizer.

use std::sync::Arc;

use {
    parking_lot::RwLock,
    serde::{Deserialize, Serialize},
    tracing::{debug, info, warn},
};

use crate::{
    audio::equalizer::{
        EqualizerManager, bass_boost_strength_to_db, db_to_bass_boost_strength, db_to_millibels,
        millibels_to_db, percent_to_virtualizer_strength, virtualizer_strength_to_percent,
    },
    config::SettingsManager,
    error::domain::{LibraryError, PresetError},
    library::{database::LibraryDatabase, models::EqPreset},
};

/// Equalizer settings in display units.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EqualizerView {
    /// Saved on/off flag.
    pub is_enabled: bool,
    /// Whether device effects are attached.
    pub is_available: bool,
    /// Built-in presets first, then custom ones.
    pub presets: Vec<EqPreset>,
    pub selected_preset: Option<EqPreset>,
    /// Whether the live settings were changed after selecting a preset.
    pub is_modified: bool,
    /// Band levels in dB, lowest frequency first.
    pub bands_db: [f32; 5],
    pub bass_boost_db: f32,
    pub virtualizer_percent: f32,
}

#[derive(Debug, Default)]
struct Selection {
    preset: Option<EqPreset>,
    is_modified: bool,
}

/// Ties the equalizer manager to stored presets and saved settings.
pub struct EqualizerController {
    manager: Arc<EqualizerManager>,
    database: Arc<LibraryDatabase>,
    settings: Arc<SettingsManager>,
    selection: RwLock<Selection>,
}

impl EqualizerController {
    pub fn new(
        manager: Arc<EqualizerManager>,
        database: Arc<LibraryDatabase>,
        settings: Arc<SettingsManager>,
    ) -> Self {
        Self {
            manager,
            database,
            settings,
            selection: RwLock::new(Selection::default()),
        }
    }

    /// The underlying manager.
    pub fn manager(&self) -> &Arc<EqualizerManager> {
        &self.manager
    }

    /// Restores the saved preset, or "Flat" when there is none, and the
    /// saved on/off flag.
    ///
    /// # Errors
    ///
    /// Returns `PresetError` if the presets cannot be read.
    pub async fn initialize(&self) -> Result<(), PresetError> {
        let (saved_id, enabled) = {
            let settings = self.settings.get_settings();
            (settings.current_preset_id, settings.eq_enabled)
        };

        let saved = match saved_id {
            Some(id) => {
                let preset = self.database.get_preset_by_id(id).await?;
                if preset.is_none() {
                    warn!("Saved equalizer preset {} no longer exists", id);
                }
                preset
            }
            None => None,
        };
        let preset = match saved {
            Some(preset) => Some(preset),
            None => self.database.get_preset_by_name(EqPreset::FLAT_NAME).await?,
        };

        if let Some(preset) = preset {
            debug!("Restoring equalizer preset {}", preset.name);
            self.manager.apply_preset(&preset);
            *self.selection.write() = Selection {
                preset: Some(preset),
                is_modified: false,
            };
        }

        self.manager.set_enabled(enabled);
        Ok(())
    }

    /// Switches the effects on or off and saves the flag.
    ///
    /// # Errors
    ///
    /// Returns `PresetError::Settings` if the flag cannot be saved.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), PresetError> {
        self.settings.set_eq_enabled(enabled)?;
        self.manager.set_enabled(enabled);
        Ok(())
    }

    /// Sets one band in dB.
    pub fn set_band_db(&self, band: usize, db: f32) {
        self.manager.set_band_level(band, db_to_millibels(db));
        self.mark_modified();
    }

    /// Sets the bass boost in dB (`0..=15`).
    pub fn set_bass_boost_db(&self, db: f32) {
        self.manager
            .set_bass_boost_strength(db_to_bass_boost_strength(db));
        self.mark_modified();
    }

    /// Sets the virtualizer in percent.
    pub fn set_virtualizer_percent(&self, percent: f32) {
        self.manager
            .set_virtualizer_strength(percent_to_virtualizer_strength(percent));
        self.mark_modified();
    }

    fn mark_modified(&self) {
        let mut selection = self.selection.write();
        if selection.preset.is_some() {
            selection.is_modified = true;
        }
    }

    /// The selected preset.
    pub fn selected_preset(&self) -> Option<EqPreset> {
        self.selection.read().preset.clone()
    }

    /// Whether the live settings differ from the selected preset.
    pub fn is_modified(&self) -> bool {
        self.selection.read().is_modified
    }

    /// Applies a preset, selects it and saves the selection.
    ///
    /// # Errors
    ///
    /// Returns `PresetError::Settings` if the selection cannot be saved.
    pub fn select_preset(&self, preset: EqPreset) -> Result<(), PresetError> {
        let id = preset.id;
        self.manager.apply_preset(&preset);
        *self.selection.write() = Selection {
            preset: Some(preset),
            is_modified: false,
        };
        self.settings.set_current_preset_id(Some(id))?;
        Ok(())
    }

    /// Re-applies the selected preset, discarding live changes.
    pub fn reset_to_preset(&self) {
        let mut selection = self.selection.write();
        if let Some(preset) = &selection.preset {
            self.manager.apply_preset(preset);
            selection.is_modified = false;
        }
    }

    /// Zeroes every band and strength.
    pub fn reset(&self) {
        self.manager.reset();
        self.selection.write().is_modified = true;
    }

    /// Stores the live settings as a custom preset and selects it.
    ///
    /// # Errors
    ///
    /// Returns `PresetError` for a blank name or a failed insert.
    pub async fn save_as_preset(&self, name: &str) -> Result<EqPreset, PresetError> {
        let state = self.manager.state();
        let preset = EqPreset {
            id: 0,
            name: name.trim().to_string(),
            is_custom: true,
            band_60hz: state.band_60hz,
            band_250hz: state.band_250hz,
            band_1khz: state.band_1khz,
            band_4khz: state.band_4khz,
            band_16khz: state.band_16khz,
            bass_boost: state.bass_boost,
            virtualizer: state.virtualizer,
            created_at: 0,
        };

        let id = self.database.insert_preset(&preset).await?;
        let saved = self
            .database
            .get_preset_by_id(id)
            .await?
            .ok_or_else(|| LibraryError::NotFound {
                entity: "preset".to_string(),
                id,
            })?;
        info!("Saved equalizer preset {}", saved.name);

        *self.selection.write() = Selection {
            preset: Some(saved.clone()),
            is_modified: false,
        };
        self.settings.set_current_preset_id(Some(id))?;
        Ok(saved)
    }

    /// Deletes a custom preset. Deleting the selected one selects "Flat".
    ///
    /// # Errors
    ///
    /// Returns `PresetError::BuiltIn` for a built-in preset, or another
    /// `PresetError` if the delete or the fallback fails.
    pub async fn delete_preset(&self, preset: &EqPreset) -> Result<bool, PresetError> {
        if !preset.is_custom {
            return Err(PresetError::BuiltIn {
                name: preset.name.clone(),
            });
        }

        let deleted = self.database.delete_custom_preset(preset.id).await?;

        let was_selected = self
            .selection
            .read()
            .preset
            .as_ref()
            .is_some_and(|selected| selected.id == preset.id);
        if was_selected
            && let Some(flat) = self.database.get_preset_by_name(EqPreset::FLAT_NAME).await?
        {
            self.select_preset(flat)?;
        }
        Ok(deleted)
    }

    /// Current settings and presets in display units.
    ///
    /// # Errors
    ///
    /// Returns `PresetError` if the presets cannot be read.
    pub async fn snapshot(&self) -> Result<EqualizerView, PresetError> {
        let presets = self.database.get_all_presets().await?;
        let state = self.manager.state();
        let selection = self.selection.read();

        Ok(EqualizerView {
            is_enabled: self.settings.get_settings().eq_enabled,
            is_available: self.manager.is_available(),
            presets,
            selected_preset: selection.preset.clone(),
            is_modified: selection.is_modified,
            bands_db: state.bands().map(millibels_to_db),
            bass_boost_db: bass_boost_strength_to_db(state.bass_boost),
            virtualizer_percent: virtualizer_strength_to_percent(state.virtualizer),
        })
    }
}
