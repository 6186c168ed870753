//! JSON configuration for the vision loop and the finder.

use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use log::{info, LevelFilter};
use retro_targets_finder::{CameraModel, FinderParams, TargetFinder, TargetModel};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("unknown log level {0:?}")]
    LogLevel(String),
}

/// Which camera feeds the loop and how it is modelled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Tag published with every message. A negative id runs the loop
    /// without a finder.
    pub camera_id: i32,
    pub model: CameraModel,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            camera_id: 0,
            model: CameraModel::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// `off`, `error`, `warn`, `info`, `debug` or `trace`.
    pub log_level: String,
    pub display_debug_images: bool,
    /// Re-read the configuration source before every frame.
    pub hot_reload: bool,
    /// How long the display waits for a key press after showing a frame.
    pub wait_key_delay_ms: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            log_level: "debug".to_string(),
            display_debug_images: false,
            hot_reload: false,
            wait_key_delay_ms: 1,
        }
    }
}

impl DiagnosticsConfig {
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| ConfigError::LogLevel(self.log_level.clone()))
    }
}

/// Top-level configuration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub camera: CameraConfig,
    pub target: TargetModel,
    pub diagnostics: DiagnosticsConfig,
    pub finder: FinderParams,
}

impl VisionConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Finder parameters with the debug switch taken from the diagnostics.
    pub fn finder_params(&self) -> FinderParams {
        FinderParams {
            debug_images: self.diagnostics.display_debug_images,
            ..self.finder.clone()
        }
    }

    /// Build the finder, or `None` when the camera id disables it.
    pub fn build_finder(&self) -> Option<TargetFinder> {
        (self.camera.camera_id >= 0)
            .then(|| TargetFinder::new(self.target, self.camera.model, self.finder_params()))
    }
}

/// Supplies the tunable configuration, once at startup and on every hot
/// reload.
pub trait ConfigSource: Send {
    fn load(&mut self) -> Result<VisionConfig, ConfigError>;
}

impl ConfigSource for VisionConfig {
    fn load(&mut self) -> Result<VisionConfig, ConfigError> {
        Ok(self.clone())
    }
}

/// Configuration kept in a JSON file. A missing file is created with the
/// defaults on first load.
#[derive(Clone, Debug)]
pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for JsonConfigFile {
    fn load(&mut self) -> Result<VisionConfig, ConfigError> {
        if !self.path.exists() {
            let config = VisionConfig::default();
            config.write_json(&self.path)?;
            info!("wrote default configuration to {}", self.path.display());
            return Ok(config);
        }
        VisionConfig::load_json(&self.path)
    }
}
