// Note mapping - Pitch selection shared by live playback and export
// Melodic tracks walk the scale of the pattern's key one degree per fired
// step; drum tracks map to fixed General MIDI percussion notes.

use crate::pattern::{Key, PitchClass, TrackId};
use std::collections::HashMap;

/// Number of pitches per scale row (one octave plus the octave note)
pub const SCALE_DEGREES: usize = 8;

/// Semitones in an octave
pub const OCTAVE: u8 = 12;

/// General MIDI percussion notes
pub const KICK_PITCH: u8 = 36;
pub const SNARE_PITCH: u8 = 38;
pub const HIHAT_CLOSED_PITCH: u8 = 42;
pub const HIHAT_OPEN_PITCH: u8 = 46;

/// Scale table, indexed by root pitch class (C = 0)
///
/// Each row rises through the major-scale degrees from the root in the
/// octave starting at MIDI 48 and ends on the root one octave up. Mode is
/// not taken into account.
pub static SCALE_TABLE: [[u8; SCALE_DEGREES]; 12] = [
    [48, 50, 52, 53, 55, 57, 59, 60], // C
    [49, 51, 53, 54, 56, 58, 60, 61], // C#
    [50, 52, 54, 55, 57, 59, 61, 62], // D
    [51, 53, 55, 56, 58, 60, 62, 63], // D#
    [52, 54, 56, 57, 59, 61, 63, 64], // E
    [53, 55, 57, 58, 60, 62, 64, 65], // F
    [54, 56, 58, 59, 61, 63, 65, 66], // F#
    [55, 57, 59, 60, 62, 64, 66, 67], // G
    [56, 58, 60, 61, 63, 65, 67, 68], // G#
    [57, 59, 61, 62, 64, 66, 68, 69], // A
    [58, 60, 62, 63, 65, 67, 69, 70], // A#
    [59, 61, 63, 64, 66, 68, 70, 71], // B
];

/// Scale row for a root
pub fn scale_for(root: PitchClass) -> &'static [u8; SCALE_DEGREES] {
    &SCALE_TABLE[root.semitone() as usize]
}

/// Fixed percussion note for a drum track. Non-drum tracks map to the kick.
pub fn drum_pitch(track: TrackId) -> u8 {
    match track {
        TrackId::Kick => KICK_PITCH,
        TrackId::Snare => SNARE_PITCH,
        TrackId::HihatClosed => HIHAT_CLOSED_PITCH,
        TrackId::HihatOpen => HIHAT_OPEN_PITCH,
        _ => KICK_PITCH,
    }
}

/// Melody pitch for the Nth fired step
pub fn melody_pitch(cursor: u32, key: &Key) -> u8 {
    scale_for(key.root())[cursor as usize % SCALE_DEGREES]
}

/// Bass pitch: the melody pitch one octave down
pub fn bass_pitch(cursor: u32, key: &Key) -> u8 {
    melody_pitch(cursor, key) - OCTAVE
}

/// Pitch for a track at a cursor value
///
/// Pure: the cursor is only read. Drum tracks ignore it.
pub fn pitch_for(track: TrackId, cursor: u32, key: &Key) -> u8 {
    match track {
        TrackId::Melody => melody_pitch(cursor, key),
        TrackId::Bass => bass_pitch(cursor, key),
        drum => drum_pitch(drum),
    }
}

/// Note name for a MIDI note number (60 = C4)
pub fn midi_note_name(note: u8) -> String {
    let octave = (note / OCTAVE) as i32 - 1;
    format!("{}{}", PitchClass::from_semitone(note).name(), octave)
}

/// Per-track note cursors for one playback session or one export run
///
/// A cursor counts how many times its track has fired so far. It is created
/// lazily at 0 the first time a track fires.
#[derive(Debug, Clone, Default)]
pub struct NoteCursors {
    positions: HashMap<TrackId, u32>,
}

impl NoteCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current (pre-increment) cursor, initializing it at 0 if needed
    pub fn current(&mut self, track: TrackId) -> u32 {
        *self.positions.entry(track).or_insert(0)
    }

    /// Cursor value without initializing it
    pub fn peek(&self, track: TrackId) -> Option<u32> {
        self.positions.get(&track).copied()
    }

    /// Advance a track's cursor by one fired step, returning the new value
    pub fn advance(&mut self, track: TrackId) -> u32 {
        let position = self.positions.entry(track).or_insert(0);
        *position += 1;
        *position
    }

    /// Take the current cursor and advance it
    pub fn next(&mut self, track: TrackId) -> u32 {
        let current = self.current(track);
        self.advance(track);
        current
    }

    /// Forget every cursor
    pub fn reset(&mut self) {
        self.positions.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
