use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Where the published experiment models live.
pub const DEFAULT_MODELS_BASE: &str = "https://trekhleb.dev/machine-learning-experiments/models";

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL or local directory containing `digits_recognition/model.json`
    pub models_base: String,
    /// Pen width on the canvas, in pixels
    pub stroke_width: f64,
    /// Drop the shown digit as soon as a new stroke is drawn
    pub clear_prediction_on_stroke: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models_base: DEFAULT_MODELS_BASE.into(),
            stroke_width: 14.0,
            clear_prediction_on_stroke: true,
        }
    }
}

impl Config {
    /// Directory: ~/.config/digits-recognition/
    fn dir() -> PathBuf {
        let mut p = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("digits-recognition");
        p
    }

    fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    pub fn exists() -> bool {
        Self::path().exists()
    }

    /// Load from disk, returning defaults if file doesn't exist or is invalid.
    pub fn load() -> Self {
        let path = Self::path();
        match fs::read_to_string(&path) {
            Ok(data) => Self::from_json(&data),
            Err(_) => Self::default(),
        }
    }

    fn from_json(data: &str) -> Self {
        serde_json::from_str(data).unwrap_or_else(|e| {
            log::warn!("Ignoring invalid config: {e}");
            Self::default()
        })
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let dir = Self::dir();
        fs::create_dir_all(&dir)?;
        let data = serde_json::to_string_pretty(self)?;
        fs::write(Self::path(), data)?;
        Ok(())
    }
}
