// MIDI module - Channel events, Standard MIDI File framing and live output

pub mod event;
#[cfg(feature = "midi-out")]
pub mod output;
pub mod smf;

pub use event::MidiEvent;
#[cfg(feature = "midi-out")]
pub use output::{MidiOutputBackend, MidiOutputError, MidiPortInfo, list_output_ports};
pub use smf::{
    MetaEvent, ParsedEvent, ParsedSmf, ParsedTrack, SmfError, SmfHeader, SmfWriter, TrackEvent,
    TrackWriter, parse, read_vlq, write_vlq,
};
