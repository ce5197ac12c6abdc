use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::synth::SynthConfig;

/// Returns the path to the settings file: `~/.config/audiostream/settings.json`
pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("audiostream");
    path.push("settings.json");
    path
}

/// WAV playback settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WavSettings {
    pub frames_per_buffer: u32,
}

impl Default for WavSettings {
    fn default() -> Self {
        Self {
            frames_per_buffer: 1024,
        }
    }
}

/// Waveform demo settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthSettings {
    pub sample_rate: u32,
    pub frames_per_buffer: u32,
    pub note_frequency: f64,
    /// How long the demo plays before aborting the stream
    pub duration_secs: f64,
}

impl Default for SynthSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            frames_per_buffer: 256,
            note_frequency: 440.0,
            duration_secs: 4.0,
        }
    }
}

impl SynthSettings {
    /// Stereo synth configuration from these settings
    pub fn config(&self) -> SynthConfig {
        SynthConfig {
            note_frequency: self.note_frequency,
            sample_rate: self.sample_rate,
            channels: 2,
        }
    }
}

/// Persisted settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Output device name; the default device when unset
    pub device: Option<String>,
    pub wav: WavSettings,
    pub synth: SynthSettings,
}

impl Settings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    /// Load settings from `path`, falling back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
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

    /// Save settings to disk as pretty JSON, logging failures.
    pub fn save(&self) {
        if let Err(e) = self.save_to(&settings_path()) {
            log::warn!("{}", e);
        }
    }

    /// Save settings to `path` as pretty JSON.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Settings(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Settings(format!("failed to serialize: {}", e)))?;
        std::fs::write(path, json)
            .map_err(|e| Error::Settings(format!("failed to write {}: {}", path.display(), e)))
    }
}
