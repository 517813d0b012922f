// Pattern module - Beat grid data model
// Six fixed tracks of sixteen steps, one tempo and one musical key

pub mod analysis;
pub mod key;
pub mod types;
pub mod validation;

pub use analysis::{BeatAnalysis, analyze};
pub use key::{Key, Mode, PitchClass};
pub use types::{
    DEFAULT_TEMPO, MAX_TEMPO, MIN_TEMPO, PLAYABLE_TEMPO_MAX, PLAYABLE_TEMPO_MIN, Pattern,
    STEPS_PER_PATTERN, Steps, TRACK_COUNT, Track, TrackId, steps_from_str,
};
pub use validation::{RawPattern, RawTrack};

/// Pattern error types
///
/// Every variant describes a malformed pattern. Malformed patterns are
/// rejected before any scheduling or encoding starts.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("Expected {expected} tracks, found {found}")]
    WrongTrackCount { expected: usize, found: usize },

    #[error("Unknown track id: {0:?}")]
    UnknownTrack(String),

    #[error("Track {0} appears more than once")]
    DuplicateTrack(TrackId),

    #[error("Track {0} is missing")]
    MissingTrack(TrackId),

    #[error("Track {track} has {found} steps, expected {expected}")]
    WrongStepCount {
        track: TrackId,
        found: usize,
        expected: usize,
    },

    #[error("Step index {0} is out of range")]
    StepOutOfRange(usize),

    #[error("Tempo {0} BPM is outside the accepted range")]
    TempoOutOfRange(u32),

    #[error("Track {0} has a non-finite volume")]
    InvalidVolume(TrackId),

    #[error("Invalid step string: {0}")]
    InvalidSteps(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
