use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::{CASCADE_URL, MASK_MODEL_NAME};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Classifier model file (ONNX). A missing file is not fatal.
    pub path: PathBuf,
    /// Where to fetch the model from when it is not present locally.
    pub url: Option<String>,
    /// Spatial size `(width, height)` fed to the classifier.
    pub input_size: (u32, u32),
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models").join(MASK_MODEL_NAME),
            url: None,
            input_size: (224, 224),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// OpenCV Haar cascade XML. Required to start a session.
    pub cascade_path: Option<PathBuf>,
    /// Fallback download for a cascade missing locally.
    pub cascade_url: Option<String>,
    pub scale_factor: f64,
    pub min_neighbors: u32,
    pub min_size: (u32, u32),
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            cascade_path: None,
            cascade_url: Some(CASCADE_URL.to_string()),
            scale_factor: 1.1,
            min_neighbors: 5,
            min_size: (30, 30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Raw scores above this are `WithMask`.
    pub mask_threshold: f64,
    /// Labels below this confidence become `Unknown`.
    pub confidence_threshold: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            mask_threshold: 0.5,
            confidence_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub alert_duration_secs: f64,
    pub violation_cooldown_secs: f64,
    pub alerts_enabled: bool,
    pub logging_enabled: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            alert_duration_secs: 3.0,
            violation_cooldown_secs: 5.0,
            alerts_enabled: true,
            logging_enabled: true,
        }
    }
}

impl AlertConfig {
    pub fn alert_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.alert_duration_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn violation_cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.violation_cooldown_secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Requested frame-source parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    /// Target processing rate; 0 disables pacing.
    pub fps: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Complete monitor configuration, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub model: ModelConfig,
    pub detection: DetectionConfig,
    pub thresholds: ThresholdConfig,
    pub alerts: AlertConfig,
    pub video: VideoConfig,
    pub log_file: PathBuf,
}

impl MonitorConfig {
    /// Platform config location, e.g. `~/.config/MaskWatch/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("MaskWatch").join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from [`Self::default_path`], falling back to defaults when the
    /// file is absent or unreadable.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring config: {e}");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, json).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.mask_threshold) {
            return Err(ConfigError::Invalid(format!(
                "mask threshold must be between 0.0 and 1.0, got {}",
                t.mask_threshold
            )));
        }
        if !(0.0..=1.0).contains(&t.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence threshold must be between 0.0 and 1.0, got {}",
                t.confidence_threshold
            )));
        }
        // Must be > 1 or the detection pyramid never grows.
        if !(self.detection.scale_factor > 1.0) {
            return Err(ConfigError::Invalid(format!(
                "scale factor must be greater than 1.0, got {}",
                self.detection.scale_factor
            )));
        }
        let (iw, ih) = self.model.input_size;
        if iw == 0 || ih == 0 {
            return Err(ConfigError::Invalid(format!(
                "model input size must be non-zero, got {iw}x{ih}"
            )));
        }
        let (mw, mh) = self.detection.min_size;
        if mw == 0 || mh == 0 {
            return Err(ConfigError::Invalid(format!(
                "minimum face size must be non-zero, got {mw}x{mh}"
            )));
        }
        let a = &self.alerts;
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !non_negative(a.alert_duration_secs) || !non_negative(a.violation_cooldown_secs) {
            return Err(ConfigError::Invalid(format!(
                "durations must be non-negative, got alert {} s, cooldown {} s",
                a.alert_duration_secs, a.violation_cooldown_secs
            )));
        }
        if self.video.width == 0 || self.video.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "video resolution must be non-zero, got {}x{}",
                self.video.width, self.video.height
            )));
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            detection: DetectionConfig::default(),
            thresholds: ThresholdConfig::default(),
            alerts: AlertConfig::default(),
            video: VideoConfig::default(),
            log_file: PathBuf::from("logs").join("violations.csv"),
        }
    }
}
