// Pattern types - Tracks, steps and the six-track beat pattern

use super::PatternError;
use super::key::Key;
use std::fmt;
use std::str::FromStr;

/// Number of steps in one loop of a pattern (sixteenth notes of one bar)
pub const STEPS_PER_PATTERN: usize = 16;

/// Number of tracks in every pattern
pub const TRACK_COUNT: usize = 6;

/// Tempo bounds accepted by validation (BPM)
pub const MIN_TEMPO: u32 = 20;
pub const MAX_TEMPO: u32 = 999;

/// Tempo bounds used for playback and export (BPM)
pub const PLAYABLE_TEMPO_MIN: u32 = 40;
pub const PLAYABLE_TEMPO_MAX: u32 = 220;

pub const DEFAULT_TEMPO: u32 = 120;

/// Step activity of one track
pub type Steps = [bool; STEPS_PER_PATTERN];

/// Track identity
///
/// The declaration order is the canonical track order. Dispatch and encoding
/// always visit tracks in this order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrackId {
    Kick,
    Snare,
    HihatClosed,
    HihatOpen,
    Bass,
    Melody,
}

impl TrackId {
    /// All track ids in canonical order
    pub const ALL: [TrackId; TRACK_COUNT] = [
        TrackId::Kick,
        TrackId::Snare,
        TrackId::HihatClosed,
        TrackId::HihatOpen,
        TrackId::Bass,
        TrackId::Melody,
    ];

    /// Wire name, e.g. "hihat_closed"
    pub fn as_str(self) -> &'static str {
        match self {
            TrackId::Kick => "kick",
            TrackId::Snare => "snare",
            TrackId::HihatClosed => "hihat_closed",
            TrackId::HihatOpen => "hihat_open",
            TrackId::Bass => "bass",
            TrackId::Melody => "melody",
        }
    }

    /// Position in canonical order
    pub fn index(self) -> usize {
        self as usize
    }

    /// Bass and melody pick pitches from the scale table
    pub fn is_melodic(self) -> bool {
        matches!(self, TrackId::Bass | TrackId::Melody)
    }

    pub fn is_drum(self) -> bool {
        !self.is_melodic()
    }

    pub fn default_name(self) -> &'static str {
        match self {
            TrackId::Kick => "Kick",
            TrackId::Snare => "Snare",
            TrackId::HihatClosed => "Hi-Hat",
            TrackId::HihatOpen => "Open HH",
            TrackId::Bass => "Bass",
            TrackId::Melody => "Melody",
        }
    }

    pub fn default_color(self) -> &'static str {
        match self {
            TrackId::Kick => "#FF4757",
            TrackId::Snare => "#FFA502",
            TrackId::HihatClosed => "#2ED573",
            TrackId::HihatOpen => "#1E90FF",
            TrackId::Bass => "#A855F7",
            TrackId::Melody => "#FF6B9D",
        }
    }

    pub fn default_volume(self) -> f32 {
        match self {
            TrackId::Kick => 0.9,
            TrackId::Snare => 0.8,
            TrackId::HihatClosed => 0.6,
            TrackId::HihatOpen => 0.5,
            TrackId::Bass => 0.85,
            TrackId::Melody => 0.7,
        }
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackId {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrackId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| PatternError::UnknownTrack(s.to_string()))
    }
}

/// Parse a step string such as "x---x---x---x---"
///
/// `x`, `X`, `1` and `*` mark an active step; `-`, `.`, `0` and `_` an
/// inactive one. Whitespace and `|` separators are ignored.
pub fn steps_from_str(text: &str) -> Result<Steps, PatternError> {
    let mut steps = [false; STEPS_PER_PATTERN];
    let mut count = 0;

    for c in text.chars() {
        let active = match c {
            'x' | 'X' | '1' | '*' => true,
            '-' | '.' | '0' | '_' => false,
            c if c.is_whitespace() || c == '|' => continue,
            other => {
                return Err(PatternError::InvalidSteps(format!(
                    "unexpected character {:?}",
                    other
                )));
            }
        };
        if count >= STEPS_PER_PATTERN {
            return Err(PatternError::InvalidSteps(format!(
                "more than {} steps",
                STEPS_PER_PATTERN
            )));
        }
        steps[count] = active;
        count += 1;
    }

    if count != STEPS_PER_PATTERN {
        return Err(PatternError::InvalidSteps(format!(
            "{} steps, expected {}",
            count, STEPS_PER_PATTERN
        )));
    }

    Ok(steps)
}

/// One instrument voice: sixteen steps plus a volume
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    id: TrackId,
    name: String,
    /// Display hint only
    color: String,
    steps: Steps,
    /// Linear volume, always within [0, 1]
    volume: f32,
}

impl Track {
    /// Create an empty track with the default name, color and volume
    pub fn new(id: TrackId) -> Self {
        Self {
            id,
            name: id.default_name().to_string(),
            color: id.default_color().to_string(),
            steps: [false; STEPS_PER_PATTERN],
            volume: id.default_volume(),
        }
    }

    pub(crate) fn from_parts(
        id: TrackId,
        name: String,
        color: String,
        steps: Steps,
        volume: f32,
    ) -> Self {
        Self {
            id,
            name,
            color,
            steps,
            volume: volume.clamp(0.0, 1.0),
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn steps(&self) -> &Steps {
        &self.steps
    }

    /// Replace all sixteen steps at once
    pub fn set_steps(&mut self, steps: Steps) {
        self.steps = steps;
    }

    /// Check whether a step is active (out-of-range steps are inactive)
    pub fn is_active(&self, step: usize) -> bool {
        self.steps.get(step).copied().unwrap_or(false)
    }

    pub fn set_step(&mut self, step: usize, active: bool) -> Result<(), PatternError> {
        let cell = self
            .steps
            .get_mut(step)
            .ok_or(PatternError::StepOutOfRange(step))?;
        *cell = active;
        Ok(())
    }

    pub fn toggle_step(&mut self, step: usize) -> Result<(), PatternError> {
        let current = self.is_active(step);
        self.set_step(step, !current)
    }

    /// Indices of the active steps, in step order
    pub fn active_steps(&self) -> impl Iterator<Item = usize> + '_ {
        self.steps
            .iter()
            .enumerate()
            .filter_map(|(i, &active)| active.then_some(i))
    }

    pub fn active_count(&self) -> usize {
        self.steps.iter().filter(|&&active| active).count()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Set volume, clamped into [0, 1]
    pub fn set_volume(&mut self, volume: f32) -> Result<(), PatternError> {
        if !volume.is_finite() {
            return Err(PatternError::InvalidVolume(self.id));
        }
        self.volume = volume.clamp(0.0, 1.0);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.steps = [false; STEPS_PER_PATTERN];
    }
}

/// A complete beat pattern
///
/// Holds exactly one track per `TrackId`, stored in canonical order, so
/// `tracks()[id.index()]` is always the track for `id`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "super::RawPattern", into = "super::RawPattern")]
pub struct Pattern {
    tempo: u32,
    name: String,
    description: String,
    key: Key,
    tracks: [Track; TRACK_COUNT],
}

impl Pattern {
    /// Create an empty pattern with default tempo, key and tracks
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            name: name.into(),
            description: String::new(),
            key: Key::default(),
            tracks: TrackId::ALL.map(Track::new),
        }
    }

    pub(crate) fn from_parts(
        tempo: u32,
        name: String,
        description: String,
        key: Key,
        tracks: [Track; TRACK_COUNT],
    ) -> Self {
        Self {
            tempo,
            name,
            description,
            key,
            tracks,
        }
    }

    /// Parse and validate a pattern from its JSON form
    pub fn from_json(json: &str) -> Result<Self, PatternError> {
        let raw: super::RawPattern = serde_json::from_str(json)?;
        Self::try_from(raw)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<String, PatternError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Builder helper: replace the steps of one track
    pub fn with_steps(mut self, id: TrackId, steps: Steps) -> Self {
        self.track_mut(id).set_steps(steps);
        self
    }

    /// Builder helper: set a validated tempo
    pub fn with_tempo(mut self, tempo: u32) -> Result<Self, PatternError> {
        self.set_tempo(tempo)?;
        Ok(self)
    }

    /// Builder helper: set the key
    pub fn with_key(mut self, key: Key) -> Self {
        self.key = key;
        self
    }

    /// Tempo as stored (BPM)
    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    /// Tempo clamped into the playable range, as handed to clock and encoder
    pub fn playable_tempo(&self) -> u32 {
        self.tempo.clamp(PLAYABLE_TEMPO_MIN, PLAYABLE_TEMPO_MAX)
    }

    /// Set tempo (rejected outside the accepted range)
    pub fn set_tempo(&mut self, tempo: u32) -> Result<(), PatternError> {
        if !(MIN_TEMPO..=MAX_TEMPO).contains(&tempo) {
            return Err(PatternError::TempoOutOfRange(tempo));
        }
        self.tempo = tempo;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn set_key(&mut self, key: Key) {
        self.key = key;
    }

    /// Tracks in canonical order
    pub fn tracks(&self) -> &[Track; TRACK_COUNT] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> &Track {
        &self.tracks[id.index()]
    }

    pub fn track_mut(&mut self, id: TrackId) -> &mut Track {
        &mut self.tracks[id.index()]
    }

    pub fn set_step(&mut self, id: TrackId, step: usize, active: bool) -> Result<(), PatternError> {
        self.track_mut(id).set_step(step, active)
    }

    pub fn toggle_step(&mut self, id: TrackId, step: usize) -> Result<(), PatternError> {
        self.track_mut(id).toggle_step(step)
    }

    pub fn set_volume(&mut self, id: TrackId, volume: f32) -> Result<(), PatternError> {
        self.track_mut(id).set_volume(volume)
    }

    /// Turn every step of every track off
    pub fn clear(&mut self) {
        for track in &mut self.tracks {
            track.clear();
        }
    }

    /// Check if any track has at least one active step
    pub fn has_any_steps(&self) -> bool {
        self.tracks.iter().any(|t| t.active_count() > 0)
    }
}

impl Default for Pattern {
    fn default() -> Self {
        let mut pattern = Self::new("New Beat");
        pattern.description = "Start by typing a prompt or selecting a genre below".to_string();
        pattern
    }
}
