// MIDI output - Live trigger backend over a system MIDI port

use super::event::MidiEvent;
use crate::export::{DRUM_CHANNEL, MELODIC_CHANNEL, RELEASE_VELOCITY};
use crate::sequencer::notes::drum_pitch;
use crate::trigger::{TriggerBackend, TriggerError, TriggerRequest};
use midir::{MidiOutput, MidiOutputConnection, SendError};
use std::time::Duration;

const CLIENT_NAME: &str = "beatgrid";

#[derive(Debug, thiserror::Error)]
pub enum MidiOutputError {
    #[error("MIDI init error: {0}")]
    Init(#[from] midir::InitError),

    #[error("No MIDI output port at index {0}")]
    NoSuchPort(usize),

    #[error("MIDI connect error: {0}")]
    Connect(String),
}

#[derive(Clone, Debug)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// List available MIDI output ports
pub fn list_output_ports() -> Vec<MidiPortInfo> {
    let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) else {
        return Vec::new();
    };
    midi_out
        .ports()
        .iter()
        .enumerate()
        .filter_map(|(index, port)| {
            midi_out
                .port_name(port)
                .ok()
                .map(|name| MidiPortInfo { index, name })
        })
        .collect()
}

struct PendingRelease {
    due: Duration,
    channel: u8,
    note: u8,
}

/// Note-offs waiting for their due time
#[derive(Default)]
struct ReleaseQueue {
    pending: Vec<PendingRelease>,
}

impl ReleaseQueue {
    fn push(&mut self, due: Duration, channel: u8, note: u8) {
        self.pending.push(PendingRelease { due, channel, note });
    }

    /// Remove and return the note-offs due at or before `now`, earliest first
    fn take_due(&mut self, now: Duration) -> Vec<MidiEvent> {
        let (mut due, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.pending).into_iter().partition(|p| p.due <= now);
        self.pending = waiting;
        due.sort_by_key(|p| p.due);
        due.into_iter()
            .map(|p| MidiEvent::NoteOff {
                channel: p.channel,
                note: p.note,
                velocity: RELEASE_VELOCITY,
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.pending.len()
    }
}

fn send_error(error: SendError) -> TriggerError {
    match error {
        SendError::InvalidData(msg) => TriggerError::Backend(msg.to_string()),
        SendError::Other(_) => TriggerError::Disconnected,
    }
}

/// Backend that plays triggers on a MIDI output port
///
/// Drums go to channel 10, bass and melody to channel 1. Note-offs are sent
/// from `poll` once their duration has elapsed, and on drop.
pub struct MidiOutputBackend {
    connection: MidiOutputConnection,
    releases: ReleaseQueue,
}

impl MidiOutputBackend {
    /// Connect to the output port at `index`
    pub fn connect(index: usize) -> Result<Self, MidiOutputError> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;
        let port = midi_out
            .ports()
            .into_iter()
            .nth(index)
            .ok_or(MidiOutputError::NoSuchPort(index))?;
        let name = midi_out.port_name(&port).unwrap_or_default();
        let connection = midi_out
            .connect(&port, "beatgrid-out")
            .map_err(|e| MidiOutputError::Connect(e.to_string()))?;
        tracing::info!(port = %name, "MIDI output connected");

        Ok(Self {
            connection,
            releases: ReleaseQueue::default(),
        })
    }

    /// Notes still sounding
    pub fn sounding(&self) -> usize {
        self.releases.len()
    }

    fn send(&mut self, event: MidiEvent) -> Result<(), TriggerError> {
        self.connection.send(&event.to_bytes()).map_err(send_error)
    }

    fn release_due(&mut self, now: Duration) -> Result<(), TriggerError> {
        for event in self.releases.take_due(now) {
            self.send(event)?;
        }
        Ok(())
    }
}

impl TriggerBackend for MidiOutputBackend {
    fn trigger(&mut self, request: &TriggerRequest) -> Result<(), TriggerError> {
        self.release_due(request.time)?;

        let channel = if request.track.is_drum() {
            DRUM_CHANNEL
        } else {
            MELODIC_CHANNEL
        };
        let note = request.pitch.unwrap_or_else(|| drum_pitch(request.track));
        let velocity = (request.gain * 127.0).round().clamp(1.0, 127.0) as u8;

        self.send(MidiEvent::NoteOn {
            channel,
            note,
            velocity,
        })?;
        self.releases.push(
            request.time + request.duration.duration(request.tempo),
            channel,
            note,
        );
        Ok(())
    }

    fn poll(&mut self, now: Duration) -> Result<(), TriggerError> {
        self.release_due(now)
    }
}

impl Drop for MidiOutputBackend {
    fn drop(&mut self) {
        if let Err(e) = self.release_due(Duration::MAX) {
            tracing::warn!(error = %e, "failed to release notes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::NoteValue;

    #[test]
    fn test_release_waits_for_duration() {
        let mut releases = ReleaseQueue::default();
        // Melody eighth at 120 BPM triggered at 0
        let due = NoteValue::Eighth.duration(120);
        releases.push(due, MELODIC_CHANNEL, 60);

        assert!(releases.take_due(Duration::from_millis(249)).is_empty());
        assert_eq!(
            releases.take_due(Duration::from_millis(250)),
            vec![MidiEvent::NoteOff {
                channel: MELODIC_CHANNEL,
                note: 60,
                velocity: RELEASE_VELOCITY
            }]
        );
        assert_eq!(releases.len(), 0);
    }

    #[test]
    fn test_releases_come_out_in_due_order() {
        let mut releases = ReleaseQueue::default();
        releases.push(Duration::from_millis(300), MELODIC_CHANNEL, 48);
        releases.push(Duration::from_millis(100), DRUM_CHANNEL, 42);
        releases.push(Duration::from_millis(900), DRUM_CHANNEL, 36);

        let notes: Vec<_> = releases
            .take_due(Duration::from_millis(500))
            .into_iter()
            .map(|e| match e {
                MidiEvent::NoteOff { note, .. } => note,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(notes, vec![42, 48]);
        assert_eq!(releases.len(), 1);
    }

    #[test]
    fn test_send_error_mapping() {
        assert!(matches!(
            send_error(SendError::Other("port closed")),
            TriggerError::Disconnected
        ));
        assert!(matches!(
            send_error(SendError::InvalidData("bad status")),
            TriggerError::Backend(_)
        ));
    }
}
