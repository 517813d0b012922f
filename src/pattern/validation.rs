// Pattern validation - Raw (wire) form of a pattern and its checks
// Patterns arrive as JSON from an external source; nothing is trusted
// until it has been converted into a `Pattern` here.

use super::PatternError;
use super::key::Key;
use super::types::{
    DEFAULT_TEMPO, MAX_TEMPO, MIN_TEMPO, Pattern, STEPS_PER_PATTERN, Steps, TRACK_COUNT, Track,
    TrackId,
};

fn default_tempo() -> u32 {
    DEFAULT_TEMPO
}

fn default_key() -> String {
    Key::DEFAULT_TEXT.to_string()
}

fn default_volume() -> f32 {
    0.8
}

/// Serializable pattern as it appears on the wire
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawPattern {
    /// Tempo in BPM; generated patterns call this field `bpm`
    #[serde(alias = "bpm", default = "default_tempo")]
    pub tempo: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_key")]
    pub key: String,
    pub tracks: Vec<RawTrack>,
}

/// Serializable track as it appears on the wire
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawTrack {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub steps: Vec<bool>,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

impl RawTrack {
    fn validate(self) -> Result<Track, PatternError> {
        let id: TrackId = self.id.parse()?;

        let steps: Steps =
            self.steps
                .as_slice()
                .try_into()
                .map_err(|_| PatternError::WrongStepCount {
                    track: id,
                    found: self.steps.len(),
                    expected: STEPS_PER_PATTERN,
                })?;

        if !self.volume.is_finite() {
            return Err(PatternError::InvalidVolume(id));
        }

        let name = if self.name.is_empty() {
            id.default_name().to_string()
        } else {
            self.name
        };
        let color = if self.color.is_empty() {
            id.default_color().to_string()
        } else {
            self.color
        };

        Ok(Track::from_parts(id, name, color, steps, self.volume))
    }
}

impl TryFrom<RawPattern> for Pattern {
    type Error = PatternError;

    fn try_from(raw: RawPattern) -> Result<Self, Self::Error> {
        if !(MIN_TEMPO..=MAX_TEMPO).contains(&raw.tempo) {
            return Err(PatternError::TempoOutOfRange(raw.tempo));
        }

        if raw.tracks.len() != TRACK_COUNT {
            return Err(PatternError::WrongTrackCount {
                expected: TRACK_COUNT,
                found: raw.tracks.len(),
            });
        }

        // Slot each track into its canonical position
        let mut slots: [Option<Track>; TRACK_COUNT] = Default::default();
        for raw_track in raw.tracks {
            let track = raw_track.validate()?;
            let slot = &mut slots[track.id().index()];
            if slot.is_some() {
                return Err(PatternError::DuplicateTrack(track.id()));
            }
            *slot = Some(track);
        }

        let mut tracks = Vec::with_capacity(TRACK_COUNT);
        for (id, slot) in TrackId::ALL.into_iter().zip(slots) {
            tracks.push(slot.ok_or(PatternError::MissingTrack(id))?);
        }
        let tracks: [Track; TRACK_COUNT] = tracks
            .try_into()
            .map_err(|_| PatternError::WrongTrackCount {
                expected: TRACK_COUNT,
                found: 0,
            })?;

        Ok(Pattern::from_parts(
            raw.tempo,
            raw.name,
            raw.description,
            Key::parse(&raw.key),
            tracks,
        ))
    }
}

impl From<Pattern> for RawPattern {
    fn from(pattern: Pattern) -> Self {
        let tracks = pattern
            .tracks()
            .iter()
            .map(|track| RawTrack {
                id: track.id().as_str().to_string(),
                name: track.name().to_string(),
                color: track.color().to_string(),
                steps: track.steps().to_vec(),
                volume: track.volume(),
            })
            .collect();

        RawPattern {
            tempo: pattern.tempo(),
            name: pattern.name().to_string(),
            description: pattern.description().to_string(),
            key: pattern.key().as_str().to_string(),
            tracks,
        }
    }
}
