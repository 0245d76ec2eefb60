use crate::audio_engine::EngineConfig;
use crate::audio_io::CpalConfig;
use crate::error::Result;
use crate::fx_components::{GateParams, PitchShiftParams, ReverbParams};
use crate::looper::LengthBounds;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SETTINGS_FILE: &str = "settings.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub host_name: Option<String>,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub sample_rate: u32,
    pub chunk_size: usize,
    pub initial_loop_lengths: Vec<f32>,
    pub min_loop_seconds: f32,
    pub max_loop_seconds: f32,
    pub recordings_dir: Option<PathBuf>,
    pub ring_buffer_chunks: usize,
    pub gate: GateParams,
    pub pitch_shift: PitchShiftParams,
    pub reverb: ReverbParams,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            host_name: None,
            input_device: None,
            output_device: None,
            sample_rate: 44100,
            chunk_size: 512,
            initial_loop_lengths: vec![2.0, 4.0, 8.0],
            min_loop_seconds: 1.0,
            max_loop_seconds: 10.0,
            recordings_dir: None,
            ring_buffer_chunks: 4, // a few chunks of slack between playback and the device
            gate: GateParams::default(),
            pitch_shift: PitchShiftParams::default(),
            reverb: ReverbParams::default(),
        }
    }
}

impl AppSettings {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            sample_rate: self.sample_rate,
            chunk_size: self.chunk_size,
            initial_loop_lengths: self.initial_loop_lengths.clone(),
            length_bounds: LengthBounds {
                min_seconds: self.min_loop_seconds,
                max_seconds: self.max_loop_seconds,
            },
            ring_buffer_chunks: self.ring_buffer_chunks,
            gate: self.gate.clamped(),
            pitch_shift: self.pitch_shift.clamped(),
            reverb: self.reverb.clamped(),
        }
    }

    pub fn cpal_config(&self) -> CpalConfig {
        CpalConfig {
            host_name: self.host_name.clone(),
            input_device: self.input_device.clone(),
            output_device: self.output_device.clone(),
            sample_rate: self.sample_rate,
            chunk_size: self.chunk_size,
        }
    }

    /// Where `session save` without a path writes to.
    pub fn recordings_dir(&self) -> PathBuf {
        self.recordings_dir
            .clone()
            .or_else(|| get_data_dir().map(|d| d.join("recordings")))
            .unwrap_or_else(|| PathBuf::from("recordings"))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "ostinato")
}

/// Falls back to an `AppSettings` folder next to the executable when the
/// platform has no config directory.
fn exe_relative_dir() -> Option<PathBuf> {
    let exe_path = env::current_exe().ok()?;
    Some(exe_path.parent()?.join("AppSettings"))
}

pub fn get_config_dir() -> Option<PathBuf> {
    let dir = project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .or_else(exe_relative_dir)?;
    if !dir.exists() {
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("Failed to create directory at {}: {}", dir.display(), e);
            return None;
        }
    }
    Some(dir)
}

pub fn get_data_dir() -> Option<PathBuf> {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .or_else(exe_relative_dir)
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<()> {
    let json_string = serde_json::to_string_pretty(settings)?;
    fs::write(path, json_string)?;
    Ok(())
}

/// Reads settings from `path`, falling back to defaults when the file is
/// missing or unreadable.
pub fn load_settings_from(path: &Path) -> AppSettings {
    if !path.exists() {
        return AppSettings::default();
    }
    match fs::read_to_string(path) {
        Ok(json_string) => match serde_json::from_str(&json_string) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to parse settings file, using defaults. Error: {}", e);
                AppSettings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read settings file, using defaults. Error: {}", e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(settings: &AppSettings) {
    if let Some(dir) = get_config_dir() {
        let path = dir.join(SETTINGS_FILE);
        match save_settings_to(&path, settings) {
            Ok(()) => info!("Settings saved to {}", path.display()),
            Err(e) => warn!("Failed to write settings to {}: {}", path.display(), e),
        }
    }
}

pub fn load_settings() -> AppSettings {
    match get_config_dir() {
        Some(dir) => load_settings_from(&dir.join(SETTINGS_FILE)),
        None => AppSettings::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_in_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{ "chunk_size": 256, "reverb": { "wet": 0.2 } }"#).unwrap();
        assert_eq!(settings.chunk_size, 256);
        assert_eq!(settings.sample_rate, 44100);
        assert_eq!(settings.reverb.wet, 0.2);
        assert_eq!(settings.reverb.decay, ReverbParams::default().decay);
        assert_eq!(settings.initial_loop_lengths, vec![2.0, 4.0, 8.0]);
    }

    #[test]
    fn save_then_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        let settings = AppSettings {
            input_device: Some("USB Interface".to_string()),
            initial_loop_lengths: vec![3.0],
            ..AppSettings::default()
        };
        save_settings_to(&path, &settings).unwrap();
        assert_eq!(load_settings_from(&path), settings);
    }

    #[test]
    fn corrupt_or_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        assert_eq!(load_settings_from(&path), AppSettings::default());
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings_from(&path), AppSettings::default());
    }

    #[test]
    fn engine_config_carries_bounds_and_clamped_params() {
        let settings = AppSettings {
            min_loop_seconds: 0.5,
            max_loop_seconds: 30.0,
            reverb: ReverbParams {
                wet: 4.0,
                ..ReverbParams::default()
            },
            ..AppSettings::default()
        };
        let config = settings.engine_config();
        assert_eq!(config.length_bounds.min_seconds, 0.5);
        assert_eq!(config.length_bounds.max_seconds, 30.0);
        assert_eq!(config.reverb.wet, 1.0);
    }
}
