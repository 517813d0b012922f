// Trigger dispatcher - Turns clock ticks into voice triggers
// One dispatcher owns one cursor map; a fresh playback session gets a fresh
// dispatcher.

use super::clock::Tick;
use super::notes::{NoteCursors, pitch_for};
use crate::pattern::{Pattern, TrackId};
use crate::trigger::{NoteValue, TriggerBackend, TriggerRequest};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

/// Smallest linear volume used for gain shaping
pub const VOLUME_FLOOR: f32 = 0.01;

/// Fraction of a track's volume fed to its voice
pub fn attenuation(track: TrackId) -> f32 {
    match track {
        TrackId::Kick => 1.0,
        TrackId::Snare => 0.5,
        TrackId::HihatClosed | TrackId::HihatOpen => 0.3,
        TrackId::Bass => 0.7,
        TrackId::Melody => 0.6,
    }
}

/// Linear gain for a track at a volume. Never zero.
pub fn effective_gain(track: TrackId, volume: f32) -> f32 {
    volume.clamp(VOLUME_FLOOR, 1.0) * attenuation(track)
}

/// Linear gain to decibels
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.log10()
}

/// Duration hint for a voice
pub fn voice_duration(track: TrackId) -> NoteValue {
    match track {
        TrackId::HihatClosed => NoteValue::ThirtySecond,
        _ => NoteValue::Eighth,
    }
}

/// Whether a voice takes a pitch (snare and hi-hats are noise voices)
pub fn is_pitched(track: TrackId) -> bool {
    matches!(track, TrackId::Kick | TrackId::Bass | TrackId::Melody)
}

/// Outcome of dispatching one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub tick: Tick,
    /// Tracks handed to the backend successfully, in dispatch order
    pub fired: Vec<TrackId>,
    /// Tracks whose trigger the backend rejected or panicked on
    pub failed: Vec<TrackId>,
}

impl TickReport {
    fn new(tick: Tick) -> Self {
        Self {
            tick,
            fired: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Tracks that were active on this step
    pub fn active_count(&self) -> usize {
        self.fired.len() + self.failed.len()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Trigger dispatcher
pub struct TriggerDispatcher<B> {
    backend: B,
    cursors: NoteCursors,
}

impl<B: TriggerBackend> TriggerDispatcher<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cursors: NoteCursors::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn cursors(&self) -> &NoteCursors {
        &self.cursors
    }

    /// Forget all note cursors
    pub fn reset(&mut self) {
        self.cursors.reset();
    }

    /// Let the backend catch up to `now` between ticks
    ///
    /// Errors and panics are logged; the transport keeps running.
    pub fn poll(&mut self, now: Duration) {
        let backend = &mut self.backend;
        match panic::catch_unwind(AssertUnwindSafe(|| backend.poll(now))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "backend poll failed"),
            Err(payload) => tracing::error!(
                panic = panic_message(payload.as_ref()),
                "backend panicked during poll"
            ),
        }
    }

    /// Dispatch one tick against a pattern snapshot
    ///
    /// Tracks are visited in canonical order. A backend error or panic is
    /// logged and does not stop the remaining tracks; the cursor of a failed
    /// track still advances since the step did fire.
    pub fn dispatch(&mut self, tick: &Tick, pattern: &Pattern) -> TickReport {
        let mut report = TickReport::new(*tick);
        let tempo = pattern.playable_tempo();

        for track in pattern.tracks() {
            if !track.is_active(tick.step) {
                continue;
            }
            let id = track.id();
            let cursor = self.cursors.next(id);

            let gain = effective_gain(id, track.volume());
            let request = TriggerRequest {
                track: id,
                pitch: is_pitched(id).then(|| pitch_for(id, cursor, pattern.key())),
                gain,
                gain_db: gain_to_db(gain),
                duration: voice_duration(id),
                tempo,
                step: tick.step,
                time: tick.time,
            };

            let backend = &mut self.backend;
            match panic::catch_unwind(AssertUnwindSafe(|| backend.trigger(&request))) {
                Ok(Ok(())) => report.fired.push(id),
                Ok(Err(e)) => {
                    tracing::warn!(track = %id, step = tick.step, error = %e, "trigger failed");
                    report.failed.push(id);
                }
                Err(payload) => {
                    tracing::error!(
                        track = %id,
                        step = tick.step,
                        panic = panic_message(payload.as_ref()),
                        "backend panicked"
                    );
                    report.failed.push(id);
                }
            }
        }

        tracing::debug!(
            step = tick.step,
            index = tick.index,
            fired = report.fired.len(),
            "tick"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::steps_from_str;
    use crate::trigger::{RecordingBackend, TriggerError};
    use std::time::Duration;

    fn tick(step: usize) -> Tick {
        Tick {
            step,
            time: Duration::from_millis(125 * step as u64),
            index: step as u64,
        }
    }

    fn all_on_step_zero() -> Pattern {
        let mut pattern = Pattern::new("Test");
        for id in TrackId::ALL {
            pattern.set_step(id, 0, true).unwrap();
        }
        pattern
    }

    #[test]
    fn test_attenuation_table() {
        assert_eq!(attenuation(TrackId::Kick), 1.0);
        assert_eq!(attenuation(TrackId::Snare), 0.5);
        assert_eq!(attenuation(TrackId::HihatClosed), 0.3);
        assert_eq!(attenuation(TrackId::HihatOpen), 0.3);
        assert_eq!(attenuation(TrackId::Bass), 0.7);
        assert_eq!(attenuation(TrackId::Melody), 0.6);
    }

    #[test]
    fn test_zero_volume_uses_floor() {
        let gain = effective_gain(TrackId::Kick, 0.0);
        assert_eq!(gain, VOLUME_FLOOR);
        assert!((gain_to_db(gain) + 40.0).abs() < 1e-4);
        assert_eq!(gain_to_db(effective_gain(TrackId::Kick, 1.0)), 0.0);
    }

    #[test]
    fn test_dispatch_in_canonical_order() {
        let pattern = all_on_step_zero();
        let mut dispatcher = TriggerDispatcher::new(RecordingBackend::new());

        let report = dispatcher.dispatch(&tick(0), &pattern);
        assert_eq!(report.fired, TrackId::ALL.to_vec());

        let order: Vec<_> = dispatcher.backend().requests().iter().map(|r| r.track).collect();
        assert_eq!(order, TrackId::ALL.to_vec());
    }

    #[test]
    fn test_inactive_step_fires_nothing() {
        let pattern = all_on_step_zero();
        let mut dispatcher = TriggerDispatcher::new(RecordingBackend::new());

        let report = dispatcher.dispatch(&tick(1), &pattern);
        assert_eq!(report.active_count(), 0);
        assert!(dispatcher.cursors().is_empty());
    }

    #[test]
    fn test_request_fields() {
        let pattern = all_on_step_zero();
        let mut dispatcher = TriggerDispatcher::new(RecordingBackend::new());
        dispatcher.dispatch(&tick(0), &pattern);

        let backend = dispatcher.backend();
        let kick = backend.requests_for(TrackId::Kick).next().unwrap();
        assert_eq!(kick.pitch, Some(36));
        assert_eq!(kick.duration, NoteValue::Eighth);

        let hat = backend.requests_for(TrackId::HihatClosed).next().unwrap();
        assert_eq!(hat.pitch, None);
        assert_eq!(hat.duration, NoteValue::ThirtySecond);

        let melody = backend.requests_for(TrackId::Melody).next().unwrap();
        assert_eq!(melody.pitch, Some(48));
        let bass = backend.requests_for(TrackId::Bass).next().unwrap();
        assert_eq!(bass.pitch, Some(36));
    }

    #[test]
    fn test_cursor_counts_only_fired_steps() {
        let pattern = Pattern::new("Gaps")
            .with_steps(TrackId::Melody, steps_from_str("x---x-----------").unwrap());
        let mut dispatcher = TriggerDispatcher::new(RecordingBackend::new());

        for step in 0..16 {
            dispatcher.dispatch(&tick(step), &pattern);
        }

        let pitches: Vec<_> = dispatcher
            .backend()
            .requests_for(TrackId::Melody)
            .map(|r| r.pitch)
            .collect();
        assert_eq!(pitches, vec![Some(48), Some(50)]);
        assert_eq!(dispatcher.cursors().peek(TrackId::Melody), Some(2));
    }

    #[test]
    fn test_backend_failure_is_isolated() {
        let pattern = all_on_step_zero();
        let backend = RecordingBackend::new().fail_on(TrackId::Snare);
        let mut dispatcher = TriggerDispatcher::new(backend);

        let report = dispatcher.dispatch(&tick(0), &pattern);
        assert_eq!(report.failed, vec![TrackId::Snare]);
        assert_eq!(report.fired.len(), 5);
        assert_eq!(dispatcher.cursors().peek(TrackId::Snare), Some(1));
    }

    /// Backend that panics instead of returning an error for one track
    struct PanickingBackend {
        panic_on: TrackId,
        accepted: Vec<TrackId>,
    }

    impl TriggerBackend for PanickingBackend {
        fn trigger(&mut self, request: &TriggerRequest) -> Result<(), TriggerError> {
            if request.track == self.panic_on {
                panic!("{} voice exploded", request.track);
            }
            self.accepted.push(request.track);
            Ok(())
        }

        fn poll(&mut self, _now: Duration) -> Result<(), TriggerError> {
            panic!("poll exploded");
        }
    }

    #[test]
    fn test_backend_panic_is_isolated() {
        let pattern = Pattern::new("Panic")
            .with_steps(TrackId::Kick, [true; 16])
            .with_steps(TrackId::Snare, [true; 16])
            .with_steps(TrackId::HihatClosed, [true; 16]);
        let mut dispatcher = TriggerDispatcher::new(PanickingBackend {
            panic_on: TrackId::Snare,
            accepted: Vec::new(),
        });

        let report = dispatcher.dispatch(&tick(0), &pattern);
        assert_eq!(report.fired, vec![TrackId::Kick, TrackId::HihatClosed]);
        assert_eq!(report.failed, vec![TrackId::Snare]);
        assert_eq!(dispatcher.cursors().peek(TrackId::Snare), Some(1));

        dispatcher.poll(Duration::from_millis(10));
        let report = dispatcher.dispatch(&tick(1), &pattern);
        assert_eq!(report.fired, vec![TrackId::Kick, TrackId::HihatClosed]);
        assert_eq!(
            dispatcher.backend().accepted,
            vec![TrackId::Kick, TrackId::HihatClosed, TrackId::Kick, TrackId::HihatClosed]
        );
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");
        let payload: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_reset_clears_cursors() {
        let pattern = all_on_step_zero();
        let mut dispatcher = TriggerDispatcher::new(RecordingBackend::new());
        dispatcher.dispatch(&tick(0), &pattern);
        dispatcher.reset();
        assert!(dispatcher.cursors().is_empty());
    }
}
