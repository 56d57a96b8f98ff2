use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::{BackendKind, SampleConversion, DEFAULT_CAPACITY_BYTES};

/// Returns the path to the settings file: `~/.config/audio-feeder/settings.json`
fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("audio-feeder");
    path.push("settings.json");
    path
}

/// Persisted audio settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    // Ring buffer
    pub ring_capacity_bytes: usize,
    pub conversion: SampleConversion,

    // Device
    pub backend: BackendKind,
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_duration_ms: u32,

    // Demo tone
    pub tone_frequency: f32,
    pub tone_volume: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            ring_capacity_bytes: DEFAULT_CAPACITY_BYTES,
            conversion: SampleConversion::Wrap,

            backend: BackendKind::Auto,
            sample_rate: 48000,
            channels: 2,
            buffer_duration_ms: 40,

            tone_frequency: 440.0,
            tone_volume: 0.25,
        }
    }
}

impl AudioSettings {
    /// Load settings, writing the defaults out if no settings file exists yet
    /// so they can be edited.
    pub fn load_or_create() -> Self {
        Self::load_or_create_at(&settings_path())
    }

    fn load_or_create_at(path: &Path) -> Self {
        if path.exists() {
            return Self::load_from(path);
        }
        let settings = Self::default();
        settings.save_to(path);
        log::info!("Wrote default settings to {}", path.display());
        settings
    }

    /// Load settings from disk, falling back to defaults on any error.
    fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk as pretty JSON.
    fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("Failed to write settings: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }
}
