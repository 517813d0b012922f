// Sequencer module - Live playback of a step pattern
// Step clock, note mapping, trigger dispatch and the playback session/player

pub mod clock;
pub mod dispatcher;
pub mod notes;
pub mod transport;

pub use clock::{StepClock, Tick, TransportState, step_interval};
pub use dispatcher::{
    TickReport, TriggerDispatcher, VOLUME_FLOOR, attenuation, effective_gain, gain_to_db,
    voice_duration,
};
pub use notes::{NoteCursors, SCALE_TABLE, drum_pitch, midi_note_name, pitch_for, scale_for};
pub use transport::{
    PlaybackSession, Player, PlayerCommand, SharedPattern, SharedTransportState,
    TransportSnapshot, lock_pattern, share_pattern,
};
