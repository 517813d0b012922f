// Trigger interface - Contract between the dispatcher and a sound backend
// The dispatcher only hands requests over; backends decide when and how
// the sound is actually produced.

pub mod backends;
pub mod queue;

pub use backends::{LoggingBackend, RecordingBackend};
pub use queue::{QueueBackend, TriggerConsumer, trigger_queue};

use crate::pattern::TrackId;
use std::time::Duration;

/// Musical length of a triggered sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteValue {
    Eighth,
    ThirtySecond,
}

impl NoteValue {
    /// Length in quarter-note beats
    pub fn beats(self) -> f64 {
        match self {
            NoteValue::Eighth => 0.5,
            NoteValue::ThirtySecond => 0.125,
        }
    }

    /// Wall-clock length at a tempo
    pub fn duration(self, tempo: u32) -> Duration {
        Duration::from_secs_f64(60.0 / f64::from(tempo.max(1)) * self.beats())
    }
}

/// One request to sound a voice
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRequest {
    pub track: TrackId,
    /// MIDI pitch, `None` for unpitched (noise) voices
    pub pitch: Option<u8>,
    /// Linear gain (0, 1]
    pub gain: f32,
    /// Same gain in decibels
    pub gain_db: f32,
    pub duration: NoteValue,
    /// Tempo the duration hint refers to (BPM)
    pub tempo: u32,
    /// Step the request belongs to
    pub step: usize,
    /// Scheduled transport time of the tick (offset from session start)
    pub time: Duration,
}

/// Trigger error types
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("Trigger queue is full")]
    QueueFull,

    /// The device or consumer behind the backend is gone
    #[error("Backend disconnected")]
    Disconnected,

    #[error("Backend error: {0}")]
    Backend(String),
}

/// A sound backend the dispatcher can hand trigger requests to
///
/// Implementations must not block until the sound has finished; a request
/// may still be pending when `trigger` returns.
pub trait TriggerBackend {
    fn trigger(&mut self, request: &TriggerRequest) -> Result<(), TriggerError>;

    /// Called on every transport poll with the current transport time, so a
    /// backend can finish work that falls between triggers (note releases)
    fn poll(&mut self, _now: Duration) -> Result<(), TriggerError> {
        Ok(())
    }
}

impl<B: TriggerBackend + ?Sized> TriggerBackend for Box<B> {
    fn trigger(&mut self, request: &TriggerRequest) -> Result<(), TriggerError> {
        (**self).trigger(request)
    }

    fn poll(&mut self, now: Duration) -> Result<(), TriggerError> {
        (**self).poll(now)
    }
}

impl<B: TriggerBackend + ?Sized> TriggerBackend for &mut B {
    fn trigger(&mut self, request: &TriggerRequest) -> Result<(), TriggerError> {
        (**self).trigger(request)
    }

    fn poll(&mut self, now: Duration) -> Result<(), TriggerError> {
        (**self).poll(now)
    }
}
