// Standard MIDI File - Chunk framing, variable-length quantities, meta events
// Writer used by the pattern exporter and a structural reader used to
// inspect exported files.

use super::event::MidiEvent;

pub const HEADER_CHUNK: [u8; 4] = *b"MThd";
pub const TRACK_CHUNK: [u8; 4] = *b"MTrk";
const HEADER_LENGTH: u32 = 6;

/// Largest value a variable-length quantity can carry (four bytes)
pub const MAX_VLQ: u32 = 0x0FFF_FFFF;

/// Largest ticks-per-quarter division (bit 15 set means SMPTE timing)
pub const MAX_DIVISION: u16 = 0x7FFF;

const META: u8 = 0xFF;
const META_TRACK_NAME: u8 = 0x03;
const META_END_OF_TRACK: u8 = 0x2F;
const META_TEMPO: u8 = 0x51;
const SYSEX: u8 = 0xF0;
const SYSEX_ESCAPE: u8 = 0xF7;

/// Errors raised while writing or reading a Standard MIDI File
#[derive(Debug, thiserror::Error)]
pub enum SmfError {
    #[error("Value {0} does not fit in a variable-length quantity")]
    VlqOverflow(u32),

    #[error("Invalid division {0}: ticks per quarter must be in 1..=32767")]
    InvalidDivision(u16),

    #[error("Unsupported SMF format {0}")]
    UnsupportedFormat(u16),

    #[error("Format 0 files hold exactly one track")]
    SingleTrackFormat,

    #[error("Too many tracks: {0}")]
    TooManyTracks(usize),

    #[error("Chunk too large: {0} bytes")]
    ChunkTooLarge(usize),

    #[error("Tempo {0} us per quarter does not fit in 24 bits")]
    TempoOutOfRange(u32),

    #[error("Event written after end of track")]
    EventAfterEnd,

    #[error("Unexpected end of data at offset {0}")]
    UnexpectedEof(usize),

    #[error("Expected chunk {expected:?} at offset {offset}")]
    BadChunk { expected: String, offset: usize },

    #[error("Invalid header length {0}")]
    BadHeaderLength(u32),

    #[error("Header declares {declared} tracks, found {found}")]
    TrackCountMismatch { declared: u16, found: usize },

    #[error("Data byte expected at offset {0}")]
    UnexpectedStatus(usize),

    #[error("Running status without a previous status byte at offset {0}")]
    MissingStatus(usize),

    #[error("Track {0} has no end-of-track marker")]
    MissingEndOfTrack(usize),

    #[error("Track {0} has data after its end-of-track marker")]
    DataAfterEnd(usize),
}

/// Append a variable-length quantity (7 bits per byte, big-endian,
/// continuation bit on every byte but the last)
pub fn write_vlq(out: &mut Vec<u8>, value: u32) -> Result<(), SmfError> {
    if value > MAX_VLQ {
        return Err(SmfError::VlqOverflow(value));
    }
    let mut bytes = [0u8; 4];
    let mut i = 3;
    let mut rest = value;
    bytes[i] = (rest & 0x7F) as u8;
    rest >>= 7;
    while rest > 0 {
        i -= 1;
        bytes[i] = ((rest & 0x7F) | 0x80) as u8;
        rest >>= 7;
    }
    out.extend_from_slice(&bytes[i..]);
    Ok(())
}

/// Read a variable-length quantity starting at `*pos`, advancing it
pub fn read_vlq(bytes: &[u8], pos: &mut usize) -> Result<u32, SmfError> {
    let mut value: u32 = 0;
    for _ in 0..4 {
        let byte = *bytes.get(*pos).ok_or(SmfError::UnexpectedEof(*pos))?;
        *pos += 1;
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(SmfError::VlqOverflow(value))
}

/// Microseconds per quarter note for a tempo
pub fn micros_per_quarter(bpm: u32) -> u32 {
    60_000_000 / bpm.max(1)
}

/// Meta event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaEvent {
    TrackName(String),
    /// Microseconds per quarter note (24-bit)
    Tempo(u32),
    EndOfTrack,
    Other { kind: u8, data: Vec<u8> },
}

impl MetaEvent {
    pub fn tempo_from_bpm(bpm: u32) -> Self {
        MetaEvent::Tempo(micros_per_quarter(bpm))
    }

    pub fn kind(&self) -> u8 {
        match self {
            MetaEvent::TrackName(_) => META_TRACK_NAME,
            MetaEvent::Tempo(_) => META_TEMPO,
            MetaEvent::EndOfTrack => META_END_OF_TRACK,
            MetaEvent::Other { kind, .. } => *kind,
        }
    }

    /// Tempo in BPM, for tempo events
    pub fn bpm(&self) -> Option<f64> {
        match self {
            MetaEvent::Tempo(micros) if *micros > 0 => Some(60_000_000.0 / f64::from(*micros)),
            _ => None,
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) -> Result<(), SmfError> {
        out.push(META);
        out.push(self.kind());
        match self {
            MetaEvent::TrackName(name) => {
                let len = u32::try_from(name.len()).map_err(|_| SmfError::ChunkTooLarge(name.len()))?;
                write_vlq(out, len)?;
                out.extend_from_slice(name.as_bytes());
            }
            MetaEvent::Tempo(micros) => {
                if *micros > 0x00FF_FFFF {
                    return Err(SmfError::TempoOutOfRange(*micros));
                }
                out.push(0x03);
                out.extend_from_slice(&micros.to_be_bytes()[1..]);
            }
            MetaEvent::EndOfTrack => out.push(0x00),
            MetaEvent::Other { data, .. } => {
                let len = u32::try_from(data.len()).map_err(|_| SmfError::ChunkTooLarge(data.len()))?;
                write_vlq(out, len)?;
                out.extend_from_slice(data);
            }
        }
        Ok(())
    }

    fn from_parts(kind: u8, data: &[u8]) -> Self {
        match kind {
            META_TRACK_NAME => MetaEvent::TrackName(String::from_utf8_lossy(data).into_owned()),
            META_TEMPO if data.len() == 3 => {
                MetaEvent::Tempo(u32::from_be_bytes([0, data[0], data[1], data[2]]))
            }
            META_END_OF_TRACK if data.is_empty() => MetaEvent::EndOfTrack,
            _ => MetaEvent::Other {
                kind,
                data: data.to_vec(),
            },
        }
    }
}

/// Anything that can appear in a track chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEvent {
    Midi(MidiEvent),
    Meta(MetaEvent),
    SysEx(Vec<u8>),
    /// Channel message not modeled by `MidiEvent` (status byte plus data)
    Channel(Vec<u8>),
}

impl TrackEvent {
    pub fn is_end_of_track(&self) -> bool {
        matches!(self, TrackEvent::Meta(MetaEvent::EndOfTrack))
    }
}

/// Builds the body of one track chunk from delta-timed events
///
/// Every status byte is written out; running status is not used.
#[derive(Debug, Default)]
pub struct TrackWriter {
    data: Vec<u8>,
    ended: bool,
}

impl TrackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: u32, event: &TrackEvent) -> Result<(), SmfError> {
        if self.ended {
            return Err(SmfError::EventAfterEnd);
        }
        write_vlq(&mut self.data, delta)?;
        match event {
            TrackEvent::Midi(midi) => midi.write_to(&mut self.data),
            TrackEvent::Meta(meta) => meta.write_to(&mut self.data)?,
            TrackEvent::SysEx(payload) => {
                self.data.push(SYSEX);
                let len = u32::try_from(payload.len())
                    .map_err(|_| SmfError::ChunkTooLarge(payload.len()))?;
                write_vlq(&mut self.data, len)?;
                self.data.extend_from_slice(payload);
            }
            TrackEvent::Channel(raw) => self.data.extend_from_slice(raw),
        }
        self.ended = event.is_end_of_track();
        Ok(())
    }

    pub fn push_midi(&mut self, delta: u32, event: MidiEvent) -> Result<(), SmfError> {
        self.push(delta, &TrackEvent::Midi(event))
    }

    pub fn push_meta(&mut self, delta: u32, event: MetaEvent) -> Result<(), SmfError> {
        self.push(delta, &TrackEvent::Meta(event))
    }

    /// Chunk body, terminated with an end-of-track marker
    pub fn finish(mut self) -> Result<Vec<u8>, SmfError> {
        if !self.ended {
            self.push_meta(0, MetaEvent::EndOfTrack)?;
        }
        Ok(self.data)
    }
}

/// Header chunk contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmfHeader {
    pub format: u16,
    pub track_count: u16,
    pub division: u16,
}

/// Assembles header and track chunks into a complete file
#[derive(Debug)]
pub struct SmfWriter {
    format: u16,
    division: u16,
    tracks: Vec<Vec<u8>>,
}

impl SmfWriter {
    pub fn new(format: u16, division: u16) -> Result<Self, SmfError> {
        if format > 2 {
            return Err(SmfError::UnsupportedFormat(format));
        }
        if division == 0 || division > MAX_DIVISION {
            return Err(SmfError::InvalidDivision(division));
        }
        Ok(Self {
            format,
            division,
            tracks: Vec::new(),
        })
    }

    pub fn add_track(&mut self, track: TrackWriter) -> Result<(), SmfError> {
        if self.format == 0 && !self.tracks.is_empty() {
            return Err(SmfError::SingleTrackFormat);
        }
        let body = track.finish()?;
        if u32::try_from(body.len()).is_err() {
            return Err(SmfError::ChunkTooLarge(body.len()));
        }
        self.tracks.push(body);
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>, SmfError> {
        let track_count =
            u16::try_from(self.tracks.len()).map_err(|_| SmfError::TooManyTracks(self.tracks.len()))?;
        if self.format == 0 && track_count != 1 {
            return Err(SmfError::SingleTrackFormat);
        }

        let body_len: usize = self.tracks.iter().map(|t| t.len() + 8).sum();
        let mut out = Vec::with_capacity(14 + body_len);

        out.extend_from_slice(&HEADER_CHUNK);
        out.extend_from_slice(&HEADER_LENGTH.to_be_bytes());
        out.extend_from_slice(&self.format.to_be_bytes());
        out.extend_from_slice(&track_count.to_be_bytes());
        out.extend_from_slice(&self.division.to_be_bytes());

        for track in &self.tracks {
            out.extend_from_slice(&TRACK_CHUNK);
            // Length fits: checked in add_track
            out.extend_from_slice(&(track.len() as u32).to_be_bytes());
            out.extend_from_slice(track);
        }
        Ok(out)
    }
}

/// Event read back from a file, at its absolute tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    pub tick: u64,
    pub event: TrackEvent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTrack {
    pub events: Vec<ParsedEvent>,
}

impl ParsedTrack {
    pub fn name(&self) -> Option<&str> {
        self.events.iter().find_map(|e| match &e.event {
            TrackEvent::Meta(MetaEvent::TrackName(name)) => Some(name.as_str()),
            _ => None,
        })
    }

    /// First tempo event, in microseconds per quarter
    pub fn tempo(&self) -> Option<u32> {
        self.events.iter().find_map(|e| match e.event {
            TrackEvent::Meta(MetaEvent::Tempo(micros)) => Some(micros),
            _ => None,
        })
    }

    pub fn midi_events(&self) -> impl Iterator<Item = (u64, &MidiEvent)> + '_ {
        self.events.iter().filter_map(|e| match &e.event {
            TrackEvent::Midi(midi) => Some((e.tick, midi)),
            _ => None,
        })
    }

    pub fn note_on_count(&self) -> usize {
        self.midi_events().filter(|(_, e)| e.is_note_on()).count()
    }

    /// Tick of the end-of-track marker
    pub fn end_tick(&self) -> u64 {
        self.events.last().map_or(0, |e| e.tick)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSmf {
    pub header: SmfHeader,
    pub tracks: Vec<ParsedTrack>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], SmfError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(SmfError::UnexpectedEof(self.bytes.len()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, SmfError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, SmfError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, SmfError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn vlq(&mut self) -> Result<u32, SmfError> {
        read_vlq(self.bytes, &mut self.pos)
    }

    fn is_done(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

/// Parse a Standard MIDI File
///
/// Checks chunk framing, the declared track count and that every track ends
/// with exactly one end-of-track marker. Unknown chunk types are skipped.
pub fn parse(bytes: &[u8]) -> Result<ParsedSmf, SmfError> {
    let mut reader = Reader { bytes, pos: 0 };

    if reader.take(4)? != HEADER_CHUNK {
        return Err(SmfError::BadChunk {
            expected: "MThd".to_string(),
            offset: 0,
        });
    }
    let header_len = reader.u32()?;
    if header_len < HEADER_LENGTH {
        return Err(SmfError::BadHeaderLength(header_len));
    }
    let format = reader.u16()?;
    let track_count = reader.u16()?;
    let division = reader.u16()?;
    reader.take((header_len - HEADER_LENGTH) as usize)?;

    if format > 2 {
        return Err(SmfError::UnsupportedFormat(format));
    }
    if division == 0 || division > MAX_DIVISION {
        return Err(SmfError::InvalidDivision(division));
    }

    let mut tracks = Vec::new();
    while !reader.is_done() {
        let offset = reader.pos;
        let kind = reader.take(4)?;
        let len = reader.u32()? as usize;
        let body = reader.take(len)?;
        if kind == TRACK_CHUNK {
            tracks.push(parse_track(body, tracks.len(), offset + 8)?);
        } else {
            tracing::debug!(offset, len, "skipping unknown chunk");
        }
    }

    if tracks.len() != usize::from(track_count) {
        return Err(SmfError::TrackCountMismatch {
            declared: track_count,
            found: tracks.len(),
        });
    }

    Ok(ParsedSmf {
        header: SmfHeader {
            format,
            track_count,
            division,
        },
        tracks,
    })
}

fn parse_track(body: &[u8], index: usize, base: usize) -> Result<ParsedTrack, SmfError> {
    let mut reader = Reader { bytes: body, pos: 0 };
    let mut events = Vec::new();
    let mut tick: u64 = 0;
    let mut running_status: Option<u8> = None;

    while !reader.is_done() {
        if events.last().is_some_and(|e: &ParsedEvent| e.event.is_end_of_track()) {
            return Err(SmfError::DataAfterEnd(index));
        }

        tick += u64::from(reader.vlq()?);
        let offset = base + reader.pos;
        let first = reader.u8()?;

        let event = match first {
            META => {
                let kind = reader.u8()?;
                let len = reader.vlq()? as usize;
                TrackEvent::Meta(MetaEvent::from_parts(kind, reader.take(len)?))
            }
            SYSEX | SYSEX_ESCAPE => {
                running_status = None;
                let len = reader.vlq()? as usize;
                TrackEvent::SysEx(reader.take(len)?.to_vec())
            }
            _ => {
                let (status, first_data) = if first & 0x80 != 0 {
                    (first, None)
                } else {
                    (running_status.ok_or(SmfError::MissingStatus(offset))?, Some(first))
                };
                let data_len =
                    MidiEvent::data_len(status).ok_or(SmfError::UnexpectedStatus(offset))?;
                running_status = Some(status);

                let mut raw = vec![status];
                raw.extend(first_data);
                while raw.len() < data_len + 1 {
                    raw.push(reader.u8()?);
                }
                if raw[1..].iter().any(|b| b & 0x80 != 0) {
                    return Err(SmfError::UnexpectedStatus(offset));
                }

                match MidiEvent::from_bytes(&raw) {
                    Some(midi) => TrackEvent::Midi(midi),
                    None => TrackEvent::Channel(raw),
                }
            }
        };

        events.push(ParsedEvent { tick, event });
    }

    match events.last() {
        Some(last) if last.event.is_end_of_track() => Ok(ParsedTrack { events }),
        _ => Err(SmfError::MissingEndOfTrack(index)),
    }
}
