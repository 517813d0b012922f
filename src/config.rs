// Configuration - Playback and export settings persisted as RON

use crate::export::{DEFAULT_MELODIC_PROGRAM, DEFAULT_TICKS_PER_QUARTER, RestEncoding};
use crate::midi::smf::MAX_DIVISION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Live playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Longest sleep of the player thread between two checks (ms)
    pub poll_interval_ms: u64,
    /// Capacity of the trigger and command queues
    pub queue_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2,
            queue_capacity: 256,
        }
    }
}

impl PlaybackConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// MIDI export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub ticks_per_quarter: u16,
    pub rest_encoding: RestEncoding,
    /// Program change sent on the melodic channel, if any
    pub melodic_program: Option<u8>,
    /// Write track-name meta events
    pub track_names: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            ticks_per_quarter: DEFAULT_TICKS_PER_QUARTER,
            rest_encoding: RestEncoding::default(),
            melodic_program: Some(DEFAULT_MELODIC_PROGRAM),
            track_names: true,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub playback: PlaybackConfig,
    pub export: ExportConfig,
}

impl Config {
    /// Default location: `<config dir>/beatgrid/config.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("beatgrid").join("config.ron"))
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Config = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Load a config file, falling back to defaults if it does not exist
    ///
    /// A file that exists but cannot be parsed is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save to a file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ppq = self.export.ticks_per_quarter;
        if ppq == 0 || ppq > MAX_DIVISION || ppq % 4 != 0 {
            return Err(ConfigError::Invalid(format!(
                "ticks_per_quarter must be a multiple of 4 in 4..={}, got {}",
                MAX_DIVISION, ppq
            )));
        }
        if let Some(program) = self.export.melodic_program {
            if program > 127 {
                return Err(ConfigError::Invalid(format!(
                    "melodic_program must be in 0..=127, got {}",
                    program
                )));
            }
        }
        if self.playback.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
