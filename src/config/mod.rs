//! User preferences and their on-disk persistence.

pub mod settings;

pub use settings::{SettingsError, SettingsManager, UserSettings, get_config_path, get_data_dir};
