// MIDI channel voice events

/// Channel voice message
///
/// Channels are zero-based (0..=15); General MIDI drums live on channel 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ProgramChange { channel: u8, program: u8 },
}

impl MidiEvent {
    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ProgramChange { channel, .. } => channel,
        }
    }

    /// Status byte (message type in the high nibble, channel in the low one)
    pub fn status(&self) -> u8 {
        let kind = match self {
            MidiEvent::NoteOff { .. } => 0x80,
            MidiEvent::NoteOn { .. } => 0x90,
            MidiEvent::ProgramChange { .. } => 0xC0,
        };
        kind | (self.channel() & 0x0F)
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self, MidiEvent::NoteOn { .. })
    }

    pub fn is_note_off(&self) -> bool {
        matches!(self, MidiEvent::NoteOff { .. })
    }

    /// Append the raw message (status plus data bytes)
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.status());
        match *self {
            MidiEvent::NoteOn { note, velocity, .. } | MidiEvent::NoteOff { note, velocity, .. } => {
                out.push(note & 0x7F);
                out.push(velocity & 0x7F);
            }
            MidiEvent::ProgramChange { program, .. } => out.push(program & 0x7F),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3);
        self.write_to(&mut out);
        out
    }

    /// Number of data bytes following a channel status byte
    pub fn data_len(status: u8) -> Option<usize> {
        match status & 0xF0 {
            0x80 | 0x90 | 0xA0 | 0xB0 | 0xE0 => Some(2),
            0xC0 | 0xD0 => Some(1),
            _ => None,
        }
    }

    /// Parse a raw MIDI message
    ///
    /// A note-on with velocity 0 is read as a note-off. Channel messages this
    /// type does not model return `None`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        let channel = status & 0x0F;

        match status & 0xF0 {
            0x90 => match data {
                [note, 0, ..] => Some(MidiEvent::NoteOff {
                    channel,
                    note: *note,
                    velocity: 0,
                }),
                [note, velocity, ..] => Some(MidiEvent::NoteOn {
                    channel,
                    note: *note,
                    velocity: *velocity,
                }),
                _ => None,
            },
            0x80 => match data {
                [note, velocity, ..] => Some(MidiEvent::NoteOff {
                    channel,
                    note: *note,
                    velocity: *velocity,
                }),
                _ => None,
            },
            0xC0 => data.first().map(|&program| MidiEvent::ProgramChange { channel, program }),
            _ => None,
        }
    }
}
