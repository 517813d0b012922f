// Export module - Standard MIDI File export of a pattern
// Encoding runs into memory and either yields a complete file or an error;
// nothing is written to disk until the whole buffer exists.

pub mod encoder;

pub use encoder::{PatternEncoder, ScheduledEvent};

use crate::config::ExportConfig;
use crate::midi::smf::SmfError;
use crate::pattern::{Pattern, PatternError, TrackId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Zero-based channel for General MIDI percussion (channel 10)
pub const DRUM_CHANNEL: u8 = 9;
/// Zero-based channel for bass and melody (channel 1)
pub const MELODIC_CHANNEL: u8 = 0;
pub const DEFAULT_TICKS_PER_QUARTER: u16 = 128;
/// Note-off velocity for every release
pub const RELEASE_VELOCITY: u8 = 90;
/// GM program 39 "Synth Bass 1" (zero-based 38)
pub const DEFAULT_MELODIC_PROGRAM: u8 = 38;
/// Pitch used for rest note-offs on the melodic channel
pub const PLACEHOLDER_PITCH: u8 = 60;
pub const CONTENT_TYPE: &str = "audio/midi";
pub const FILE_EXTENSION: &str = "mid";
pub const FALLBACK_FILE_STEM: &str = "beatgrid";

/// How inactive steps are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RestEncoding {
    /// A note-off at the end of every rest step (placeholder pitch on the
    /// melodic channel, the drum's own pitch on the drum channel)
    #[default]
    ExplicitNoteOff,
    /// Rests only advance time
    Advance,
}

/// Export error types
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] PatternError),

    #[error("Encoding failed: {0}")]
    Smf(#[from] SmfError),

    #[error("Invalid export configuration: {0}")]
    InvalidConfig(String),

    #[error("Pitch {pitch} out of MIDI range on track {track}")]
    PitchOutOfRange { track: TrackId, pitch: i32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A finished MIDI file ready to be delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiExport {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl MidiExport {
    /// Write the file into `dir` under its file name
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let path = dir.join(&self.file_name);
        self.write_to(&path)?;
        Ok(path)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ExportError> {
        std::fs::write(path, &self.bytes)?;
        tracing::info!(path = %path.display(), bytes = self.bytes.len(), "MIDI file written");
        Ok(())
    }
}

/// File name for a pattern: its name made safe for file systems, plus `.mid`
pub fn file_name_for(pattern_name: &str) -> String {
    let stem = sanitize_file_name(pattern_name);
    let stem = if stem.is_empty() {
        FALLBACK_FILE_STEM.to_string()
    } else {
        stem
    };
    format!("{}.{}", stem, FILE_EXTENSION)
}

/// Replace path separators, reserved and control characters with `_`
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    replaced.trim().trim_matches('.').trim().to_string()
}

/// Encode a pattern with the given settings
pub fn export_pattern(pattern: &Pattern, config: &ExportConfig) -> Result<MidiExport, ExportError> {
    PatternEncoder::from_config(config)?.export(pattern)
}

/// Validate a JSON pattern and encode it
///
/// A malformed pattern is rejected before any encoding starts.
pub fn export_json(json: &str, config: &ExportConfig) -> Result<MidiExport, ExportError> {
    let pattern = Pattern::from_json(json)?;
    export_pattern(&pattern, config)
}
