//! User preference management with XDG Base Directory compliance.
//!
//! Preferences are stored as JSON under the XDG config home; the library
//! database lives under the XDG data home.

use std::{
    env::var,
    fs::{create_dir_all, read_to_string, write},
    io::Error as StdError,
    path::PathBuf,
};

use {
    parking_lot::{RwLock, RwLockReadGuard},
    serde::{Deserialize, Serialize},
    serde_json::{Error as SerdeJsonError, from_str, to_string_pretty},
    thiserror::Error,
    tracing::debug,
};

/// Application directory name under the XDG base directories.
const APP_DIR_NAME: &str = "tapedeck";

/// Error type for settings operations.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Failed to read or write settings file.
    #[error("IO error: {0}")]
    IoError(#[from] StdError),
    /// Failed to serialize or deserialize settings.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] SerdeJsonError),
    /// Invalid settings value.
    #[error("Invalid settings value: {reason}")]
    InvalidValue { reason: String },
}

/// Serializable user settings structure with default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Whether the audio effect chain is switched on.
    pub eq_enabled: bool,
    /// Id of the last selected equalizer preset.
    pub current_preset_id: Option<i64>,
    /// Whether tracks should run into each other without a gap.
    pub gapless_playback: bool,
    /// Whether the last queue should be restored on start.
    pub resume_on_start: bool,
    /// Whether scan folders are rescanned on start and watched for changes.
    pub auto_scan: bool,
    /// Whether file names are shown with their extension.
    pub show_file_extensions: bool,
    /// Interval between playback progress updates.
    pub progress_interval_ms: u64,
    /// Position after which "previous" restarts the current song.
    pub previous_restart_threshold_ms: u64,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            eq_enabled: false,
            current_preset_id: None,
            gapless_playback: true,
            resume_on_start: true,
            auto_scan: true,
            show_file_extensions: true,
            progress_interval_ms: 200,
            previous_restart_threshold_ms: 3000,
        }
    }
}

impl UserSettings {
    /// Checks values that serde cannot reject on its own.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidValue` for a zero progress interval.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.progress_interval_ms == 0 {
            return Err(SettingsError::InvalidValue {
                reason: "progress_interval_ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Handles loading, saving, and validation of user preferences.
#[derive(Debug)]
pub struct SettingsManager {
    /// Thread-safe user settings storage.
    settings: RwLock<UserSettings>,
    /// Path to the configuration file on disk.
    config_path: PathBuf,
}

impl SettingsManager {
    /// Creates a new settings manager with the default config path.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if settings cannot be loaded from disk.
    pub fn new() -> Result<Self, SettingsError> {
        Self::with_config_path(get_config_path())
    }

    /// Creates a new settings manager with a custom config path.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Custom path for the settings file
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the file exists but cannot be read or
    /// parsed, or holds invalid values.
    pub fn with_config_path(config_path: PathBuf) -> Result<Self, SettingsError> {
        if let Some(parent) = config_path.parent() {
            create_dir_all(parent)?;
        }

        let settings = if config_path.exists() {
            debug!("Loading settings from existing file: {:?}", config_path);
            let contents = read_to_string(&config_path)?;
            let settings: UserSettings = from_str(&contents)?;
            settings.validate()?;
            settings
        } else {
            debug!("Using default settings, file not found: {:?}", config_path);
            UserSettings::default()
        };

        Ok(SettingsManager {
            settings: RwLock::new(settings),
            config_path,
        })
    }

    /// Gets the current settings.
    pub fn get_settings(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.settings.read()
    }

    /// Gets the configuration file path.
    pub fn get_config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Replaces the settings and saves them to disk.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the new settings are invalid or cannot
    /// be saved.
    pub fn update_settings(&self, new_settings: UserSettings) -> Result<(), SettingsError> {
        new_settings.validate()?;
        *self.settings.write() = new_settings;
        self.save_settings()
    }

    /// Persists the equalizer on/off flag.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if settings cannot be saved.
    pub fn set_eq_enabled(&self, enabled: bool) -> Result<(), SettingsError> {
        self.settings.write().eq_enabled = enabled;
        self.save_settings()
    }

    /// Persists the selected equalizer preset.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if settings cannot be saved.
    pub fn set_current_preset_id(&self, preset_id: Option<i64>) -> Result<(), SettingsError> {
        self.settings.write().current_preset_id = preset_id;
        self.save_settings()
    }

    /// Persists both equalizer values in one write.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if settings cannot be saved.
    pub fn update_eq_settings(
        &self,
        enabled: bool,
        preset_id: Option<i64>,
    ) -> Result<(), SettingsError> {
        {
            let mut settings = self.settings.write();
            settings.eq_enabled = enabled;
            settings.current_preset_id = preset_id;
        }
        self.save_settings()
    }

    fn save_settings(&self) -> Result<(), SettingsError> {
        debug!("Saving settings to file: {:?}", self.config_path);
        let contents = to_string_pretty(&*self.settings.read())?;
        write(&self.config_path, contents)?;
        Ok(())
    }
}

/// Path of the settings file under the XDG config home.
#[must_use]
pub fn get_config_path() -> PathBuf {
    let mut config_dir = xdg_home("XDG_CONFIG_HOME", ".config");
    config_dir.push(APP_DIR_NAME);
    config_dir.push("settings.json");
    config_dir
}

/// Directory holding the library database under the XDG data home.
#[must_use]
pub fn get_data_dir() -> PathBuf {
    let mut data_dir = xdg_home("XDG_DATA_HOME", ".local/share");
    data_dir.push(APP_DIR_NAME);
    data_dir
}

/// Resolves an XDG base directory, falling back to `$HOME/<fallback>`.
fn xdg_home(variable: &str, fallback: &str) -> PathBuf {
    if let Ok(dir) = var(variable)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }

    if let Ok(home) = var("HOME") {
        let mut path = PathBuf::from(home);
        path.push(fallback);
        return path;
    }

    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use std::fs::write;

    use {
        serde_json::{from_str, to_string},
        tempfile::tempdir,
    };

    use crate::config::settings::{SettingsError, SettingsManager, UserSettings};

    #[test]
    fn test_user_settings_default() {
        let settings = UserSettings::default();
        assert!(!settings.eq_enabled);
        assert_eq!(settings.current_preset_id, None);
        assert!(settings.gapless_playback);
        assert!(settings.resume_on_start);
        assert!(settings.auto_scan);
        assert!(settings.show_file_extensions);
        assert_eq!(settings.progress_interval_ms, 200);
        assert_eq!(settings.previous_restart_threshold_ms, 3000);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let settings: UserSettings = from_str(r#"{"eq_enabled": true}"#).unwrap();
        assert!(settings.eq_enabled);
        assert!(settings.auto_scan);
        assert_eq!(settings.progress_interval_ms, 200);

        let serialized = to_string(&settings).unwrap();
        assert_eq!(from_str::<UserSettings>(&serialized).unwrap(), settings);
    }

    #[test]
    fn test_eq_setters_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let manager = SettingsManager::with_config_path(path.clone()).unwrap();
        manager.set_eq_enabled(true).unwrap();
        manager.set_current_preset_id(Some(7)).unwrap();

        let reloaded = SettingsManager::with_config_path(path.clone()).unwrap();
        assert!(reloaded.get_settings().eq_enabled);
        assert_eq!(reloaded.get_settings().current_preset_id, Some(7));

        reloaded.update_eq_settings(false, None).unwrap();
        let reloaded = SettingsManager::with_config_path(path).unwrap();
        assert!(!reloaded.get_settings().eq_enabled);
        assert_eq!(reloaded.get_settings().current_preset_id, None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        write(&path, r#"{"progress_interval_ms": 0}"#).unwrap();

        let result = SettingsManager::with_config_path(path);
        assert!(matches!(result, Err(SettingsError::InvalidValue { .. })));
    }

    #[test]
    fn test_settings_error_display() {
        let invalid_value_error = SettingsError::InvalidValue {
            reason: "test reason".to_string(),
        };
        assert_eq!(
            invalid_value_error.to_string(),
            "Invalid settings value: test reason"
        );
    }
}
