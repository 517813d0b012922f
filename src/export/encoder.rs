// Pattern encoder - Offline rendition of a pattern as a two-track MIDI file
// Uses the same note mapping and cursor rules as live playback, with its
// own cursor map per run.

use super::{
    DEFAULT_MELODIC_PROGRAM, DEFAULT_TICKS_PER_QUARTER, DRUM_CHANNEL, ExportError, MELODIC_CHANNEL,
    MidiExport, PLACEHOLDER_PITCH, RELEASE_VELOCITY, RestEncoding, CONTENT_TYPE, file_name_for,
};
use crate::config::ExportConfig;
use crate::midi::event::MidiEvent;
use crate::midi::smf::{MAX_DIVISION, MetaEvent, SmfError, SmfWriter, TrackWriter};
use crate::pattern::{Pattern, STEPS_PER_PATTERN, TrackId};
use crate::sequencer::dispatcher::VOLUME_FLOOR;
use crate::sequencer::notes::{NoteCursors, drum_pitch, pitch_for};

const DRUM_TRACKS: [TrackId; 4] = [
    TrackId::Kick,
    TrackId::Snare,
    TrackId::HihatClosed,
    TrackId::HihatOpen,
];
const MELODIC_TRACKS: [TrackId; 2] = [TrackId::Bass, TrackId::Melody];

const DRUM_TRACK_NAME: &str = "Drums";
const MELODIC_TRACK_NAME: &str = "Melody/Bass";

/// A channel event placed on the absolute tick timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub tick: u32,
    pub track: TrackId,
    pub step: usize,
    pub event: MidiEvent,
}

impl ScheduledEvent {
    /// Ordering at equal ticks: note-offs first, then track order, then step
    fn sort_key(&self) -> (u32, u8, TrackId, usize) {
        let phase = if self.event.is_note_off() { 0 } else { 1 };
        (self.tick, phase, self.track, self.step)
    }
}

/// MIDI velocity for a track volume; never 0
pub fn velocity_for(volume: f32) -> u8 {
    (volume.clamp(VOLUME_FLOOR, 1.0) * 127.0).round().clamp(1.0, 127.0) as u8
}

/// Pattern to Standard MIDI File encoder
///
/// Format 1 with two tracks: drums on channel 10 and bass plus melody on
/// channel 1. Each step lasts one sixteenth note (a quarter of the
/// division).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternEncoder {
    ticks_per_quarter: u16,
    rest_encoding: RestEncoding,
    melodic_program: Option<u8>,
    track_names: bool,
}

impl Default for PatternEncoder {
    fn default() -> Self {
        Self {
            ticks_per_quarter: DEFAULT_TICKS_PER_QUARTER,
            rest_encoding: RestEncoding::default(),
            melodic_program: Some(DEFAULT_MELODIC_PROGRAM),
            track_names: true,
        }
    }
}

impl PatternEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ExportConfig) -> Result<Self, ExportError> {
        Self::new()
            .with_ticks_per_quarter(config.ticks_per_quarter)
            .map(|encoder| {
                encoder
                    .with_rest_encoding(config.rest_encoding)
                    .with_melodic_program(config.melodic_program)
                    .with_track_names(config.track_names)
            })
    }

    /// Set the division; must be a positive multiple of 4 up to 32764
    pub fn with_ticks_per_quarter(mut self, ticks_per_quarter: u16) -> Result<Self, ExportError> {
        if ticks_per_quarter == 0 || ticks_per_quarter % 4 != 0 || ticks_per_quarter > MAX_DIVISION {
            return Err(ExportError::InvalidConfig(format!(
                "ticks per quarter must be a positive multiple of 4 up to 32764, got {}",
                ticks_per_quarter
            )));
        }
        self.ticks_per_quarter = ticks_per_quarter;
        Ok(self)
    }

    pub fn with_rest_encoding(mut self, rest_encoding: RestEncoding) -> Self {
        self.rest_encoding = rest_encoding;
        self
    }

    pub fn with_melodic_program(mut self, program: Option<u8>) -> Self {
        self.melodic_program = program;
        self
    }

    pub fn with_track_names(mut self, track_names: bool) -> Self {
        self.track_names = track_names;
        self
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.ticks_per_quarter
    }

    /// Ticks per step (one sixteenth note)
    pub fn step_ticks(&self) -> u32 {
        u32::from(self.ticks_per_quarter) / 4
    }

    /// Timeline of channel events for both output tracks, sorted
    ///
    /// Returns `(drum events, melodic events)`.
    pub fn schedule(
        &self,
        pattern: &Pattern,
    ) -> Result<(Vec<ScheduledEvent>, Vec<ScheduledEvent>), ExportError> {
        let mut cursors = NoteCursors::new();
        let drums = self.schedule_channel(pattern, &DRUM_TRACKS, DRUM_CHANNEL, &mut cursors)?;
        let melodic =
            self.schedule_channel(pattern, &MELODIC_TRACKS, MELODIC_CHANNEL, &mut cursors)?;
        Ok((drums, melodic))
    }

    fn schedule_channel(
        &self,
        pattern: &Pattern,
        tracks: &[TrackId],
        channel: u8,
        cursors: &mut NoteCursors,
    ) -> Result<Vec<ScheduledEvent>, ExportError> {
        let step_ticks = self.step_ticks();
        let mut events = Vec::new();

        for &id in tracks {
            let track = pattern.track(id);
            let velocity = velocity_for(track.volume());

            for step in 0..STEPS_PER_PATTERN {
                let start = step as u32 * step_ticks;
                let end = start + step_ticks;

                if track.is_active(step) {
                    let cursor = cursors.next(id);
                    let note = checked_pitch(id, pitch_for(id, cursor, pattern.key()))?;
                    events.push(ScheduledEvent {
                        tick: start,
                        track: id,
                        step,
                        event: MidiEvent::NoteOn {
                            channel,
                            note,
                            velocity,
                        },
                    });
                    events.push(ScheduledEvent {
                        tick: end,
                        track: id,
                        step,
                        event: MidiEvent::NoteOff {
                            channel,
                            note,
                            velocity: RELEASE_VELOCITY,
                        },
                    });
                } else if self.rest_encoding == RestEncoding::ExplicitNoteOff {
                    let note = if id.is_melodic() {
                        PLACEHOLDER_PITCH
                    } else {
                        drum_pitch(id)
                    };
                    events.push(ScheduledEvent {
                        tick: end,
                        track: id,
                        step,
                        event: MidiEvent::NoteOff {
                            channel,
                            note,
                            velocity: RELEASE_VELOCITY,
                        },
                    });
                }
            }
        }

        events.sort_by_key(ScheduledEvent::sort_key);
        Ok(events)
    }

    fn write_track(
        &self,
        name: &str,
        tempo: u32,
        program: Option<(u8, u8)>,
        events: &[ScheduledEvent],
    ) -> Result<TrackWriter, SmfError> {
        let mut track = TrackWriter::new();
        if self.track_names {
            track.push_meta(0, MetaEvent::TrackName(name.to_string()))?;
        }
        track.push_meta(0, MetaEvent::tempo_from_bpm(tempo))?;
        if let Some((channel, program)) = program {
            track.push_midi(0, MidiEvent::ProgramChange { channel, program })?;
        }

        let mut last_tick = 0;
        for scheduled in events {
            track.push_midi(scheduled.tick - last_tick, scheduled.event)?;
            last_tick = scheduled.tick;
        }
        Ok(track)
    }

    /// Encode a pattern to the bytes of a complete MIDI file
    ///
    /// Deterministic: the same pattern and settings always give the same
    /// bytes.
    pub fn encode(&self, pattern: &Pattern) -> Result<Vec<u8>, ExportError> {
        if let Some(program) = self.melodic_program.filter(|p| *p > 127) {
            return Err(ExportError::InvalidConfig(format!(
                "program {} out of MIDI range",
                program
            )));
        }

        let tempo = pattern.playable_tempo();
        let (drums, melodic) = self.schedule(pattern)?;

        let mut writer = SmfWriter::new(1, self.ticks_per_quarter)?;
        writer.add_track(self.write_track(DRUM_TRACK_NAME, tempo, None, &drums)?)?;
        writer.add_track(self.write_track(
            MELODIC_TRACK_NAME,
            tempo,
            self.melodic_program.map(|p| (MELODIC_CHANNEL, p)),
            &melodic,
        )?)?;
        let bytes = writer.finish()?;

        tracing::debug!(
            pattern = pattern.name(),
            tempo,
            drum_events = drums.len(),
            melodic_events = melodic.len(),
            bytes = bytes.len(),
            "pattern encoded"
        );
        Ok(bytes)
    }

    /// Encode a pattern into a deliverable file
    pub fn export(&self, pattern: &Pattern) -> Result<MidiExport, ExportError> {
        let bytes = self.encode(pattern)?;
        Ok(MidiExport {
            file_name: file_name_for(pattern.name()),
            content_type: CONTENT_TYPE,
            bytes,
        })
    }
}

fn checked_pitch(track: TrackId, pitch: u8) -> Result<u8, ExportError> {
    if pitch > 127 {
        return Err(ExportError::PitchOutOfRange {
            track,
            pitch: i32::from(pitch),
        });
    }
    Ok(pitch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::smf::{TrackEvent, parse};
    use crate::pattern::steps_from_str;

    fn note_ons(events: &[ScheduledEvent], track: TrackId) -> Vec<(u32, u8)> {
        events
            .iter()
            .filter(|e| e.track == track)
            .filter_map(|e| match e.event {
                MidiEvent::NoteOn { note, .. } => Some((e.tick, note)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_velocity_never_zero() {
        assert_eq!(velocity_for(0.0), 1);
        assert_eq!(velocity_for(1.0), 127);
        assert_eq!(velocity_for(0.8), 102);
        assert_eq!(velocity_for(5.0), 127);
    }

    #[test]
    fn test_ticks_per_quarter_validation() {
        assert!(PatternEncoder::new().with_ticks_per_quarter(0).is_err());
        assert!(PatternEncoder::new().with_ticks_per_quarter(130).is_err());
        assert_eq!(
            PatternEncoder::new()
                .with_ticks_per_quarter(480)
                .unwrap()
                .step_ticks(),
            120
        );
        assert_eq!(PatternEncoder::new().step_ticks(), 32);
    }

    #[test]
    fn test_melodic_cursor_skips_gaps() {
        let pattern = Pattern::new("Gaps")
            .with_steps(TrackId::Melody, steps_from_str("x---x-----------").unwrap());
        let (_, melodic) = PatternEncoder::new().schedule(&pattern).unwrap();
        assert_eq!(note_ons(&melodic, TrackId::Melody), vec![(0, 48), (128, 50)]);
    }

    #[test]
    fn test_bass_octave_below_melody() {
        let steps = steps_from_str("x-x-x-x---------").unwrap();
        let pattern = Pattern::new("Octaves")
            .with_steps(TrackId::Melody, steps)
            .with_steps(TrackId::Bass, steps);
        let (_, melodic) = PatternEncoder::new().schedule(&pattern).unwrap();

        let melody = note_ons(&melodic, TrackId::Melody);
        let bass = note_ons(&melodic, TrackId::Bass);
        assert_eq!(melody.len(), 4);
        for ((mt, mn), (bt, bn)) in melody.iter().zip(&bass) {
            assert_eq!(mt, bt);
            assert_eq!(*mn, bn + 12);
        }
    }

    #[test]
    fn test_layered_drums_share_ticks() {
        let pattern = Pattern::new("Layers")
            .with_steps(TrackId::Kick, steps_from_str("x---------------").unwrap())
            .with_steps(TrackId::HihatClosed, steps_from_str("x---------------").unwrap());
        let (drums, _) = PatternEncoder::new()
            .with_rest_encoding(RestEncoding::Advance)
            .schedule(&pattern)
            .unwrap();

        let ons: Vec<_> = drums
            .iter()
            .filter(|e| e.event.is_note_on())
            .map(|e| (e.tick, e.track))
            .collect();
        assert_eq!(ons, vec![(0, TrackId::Kick), (0, TrackId::HihatClosed)]);
    }

    #[test]
    fn test_note_offs_sort_before_note_ons() {
        let pattern = Pattern::new("Repeat")
            .with_steps(TrackId::Kick, steps_from_str("xx--------------").unwrap());
        let (drums, _) = PatternEncoder::new()
            .with_rest_encoding(RestEncoding::Advance)
            .schedule(&pattern)
            .unwrap();

        let at_32: Vec<_> = drums.iter().filter(|e| e.tick == 32).collect();
        assert_eq!(at_32.len(), 2);
        assert!(at_32[0].event.is_note_off());
        assert!(at_32[1].event.is_note_on());
    }

    #[test]
    fn test_rest_quirk_emits_placeholder_note_offs() {
        let pattern = Pattern::new("Rests");
        let (drums, melodic) = PatternEncoder::new().schedule(&pattern).unwrap();

        assert_eq!(drums.len(), 4 * 16);
        assert_eq!(melodic.len(), 2 * 16);
        assert!(melodic.iter().all(|e| matches!(
            e.event,
            MidiEvent::NoteOff { note: 60, velocity: 90, .. }
        )));
        assert!(drums.iter().filter(|e| e.track == TrackId::Snare).all(|e| matches!(
            e.event,
            MidiEvent::NoteOff { note: 38, channel: 9, .. }
        )));
    }

    #[test]
    fn test_note_off_release_velocity() {
        let pattern = Pattern::new("Release")
            .with_steps(TrackId::Kick, steps_from_str("x---------------").unwrap());
        let parsed = parse(&PatternEncoder::new().encode(&pattern).unwrap()).unwrap();

        let kick_off = parsed.tracks[0]
            .midi_events()
            .find(|(_, e)| e.is_note_off())
            .unwrap();
        assert_eq!(
            kick_off,
            (32, &MidiEvent::NoteOff { channel: 9, note: 36, velocity: 90 })
        );
    }

    #[test]
    fn test_advance_drops_rest_events() {
        let pattern = Pattern::new("Rests");
        let (drums, melodic) = PatternEncoder::new()
            .with_rest_encoding(RestEncoding::Advance)
            .schedule(&pattern)
            .unwrap();
        assert!(drums.is_empty());
        assert!(melodic.is_empty());
    }

    #[test]
    fn test_encoded_tracks_layout() {
        let pattern = Pattern::new("Layout")
            .with_steps(TrackId::Kick, steps_from_str("x---x---x---x---").unwrap());
        let bytes = PatternEncoder::new().encode(&pattern).unwrap();
        let parsed = parse(&bytes).unwrap();

        assert_eq!(parsed.header.format, 1);
        assert_eq!(parsed.header.track_count, 2);
        assert_eq!(parsed.header.division, 128);

        let drums = &parsed.tracks[0];
        assert_eq!(drums.name(), Some("Drums"));
        assert_eq!(drums.tempo(), Some(500_000));
        assert_eq!(drums.note_on_count(), 4);
        assert_eq!(drums.end_tick(), 16 * 32);

        let melodic = &parsed.tracks[1];
        assert_eq!(melodic.name(), Some("Melody/Bass"));
        assert!(melodic.events.iter().any(|e| e.event
            == TrackEvent::Midi(MidiEvent::ProgramChange {
                channel: 0,
                program: 38
            })));
    }

    #[test]
    fn test_encoder_uses_playable_tempo() {
        let pattern = Pattern::new("Fast").with_tempo(300).unwrap();
        let parsed = parse(&PatternEncoder::new().encode(&pattern).unwrap()).unwrap();
        assert_eq!(parsed.tracks[0].tempo(), Some(60_000_000 / 220));
    }

    #[test]
    fn test_minimal_header_bytes() {
        let bytes = PatternEncoder::new()
            .with_track_names(false)
            .with_melodic_program(None)
            .with_rest_encoding(RestEncoding::Advance)
            .encode(&Pattern::new("Empty"))
            .unwrap();

        let track_body = [0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, 0x00, 0xFF, 0x2F, 0x00];
        let mut expected = b"MThd".to_vec();
        expected.extend_from_slice(&[0, 0, 0, 6, 0, 1, 0, 2, 0, 128]);
        for _ in 0..2 {
            expected.extend_from_slice(b"MTrk");
            expected.extend_from_slice(&(track_body.len() as u32).to_be_bytes());
            expected.extend_from_slice(&track_body);
        }
        assert_eq!(bytes, expected);
    }
}
