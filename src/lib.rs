// beatgrid - Step pattern sequencer with live triggering and MIDI export

pub mod config;
pub mod export;
pub mod midi;
pub mod pattern;
pub mod sequencer;
pub mod trigger;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigError, ExportConfig, PlaybackConfig};
pub use export::{ExportError, MidiExport, PatternEncoder, RestEncoding, export_pattern};
pub use midi::event::MidiEvent;
pub use pattern::{BeatAnalysis, Key, Pattern, PatternError, Track, TrackId, analyze};
pub use sequencer::{
    NoteCursors, PlaybackSession, Player, SharedTransportState, StepClock, Tick, TransportState,
    TriggerDispatcher,
};
pub use trigger::{NoteValue, TriggerBackend, TriggerError, TriggerRequest};
