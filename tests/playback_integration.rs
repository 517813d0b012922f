//! Playback integration tests
//!
//! Drive a full playback session (clock, dispatcher, shared observable)
//! against recording and queue backends and check timing, note cursors and
//! agreement with the MIDI exporter.

use beatgrid::export::PatternEncoder;
use beatgrid::pattern::{Key, Pattern, Steps, TrackId, steps_from_str};
use beatgrid::sequencer::notes::SCALE_TABLE;
use beatgrid::sequencer::{PlaybackSession, TransportState, share_pattern, step_interval};
use beatgrid::trigger::{RecordingBackend, trigger_queue};
use beatgrid::MidiEvent;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ringbuf::traits::Consumer;
use std::time::Duration;

fn random_steps(rng: &mut StdRng) -> Steps {
    let mut steps = [false; 16];
    for step in steps.iter_mut() {
        *step = rng.gen_bool(0.4);
    }
    steps
}

fn random_pattern(rng: &mut StdRng) -> Pattern {
    let roots = ["C", "D#", "F", "Gb", "A", "B"];
    let mut pattern = Pattern::new("Random")
        .with_key(Key::parse(&format!("{} minor", roots[rng.gen_range(0..roots.len())])))
        .with_tempo(rng.gen_range(40..=220))
        .unwrap();
    for id in TrackId::ALL {
        pattern.track_mut(id).set_steps(random_steps(rng));
    }
    pattern
}

/// Run one full loop and return the session's backend
fn play_one_loop(pattern: Pattern) -> RecordingBackend {
    let tempo = pattern.playable_tempo();
    let mut session = PlaybackSession::new(share_pattern(pattern), RecordingBackend::new());
    session.start(Duration::ZERO);
    session.run_until(step_interval(tempo) * 15);
    session.stop();
    session.into_backend()
}

#[test]
fn test_tick_spacing_matches_tempo() {
    for tempo in [40, 90, 120, 175, 220] {
        let pattern = Pattern::new("Spacing")
            .with_steps(TrackId::Kick, [true; 16])
            .with_tempo(tempo)
            .unwrap();
        let backend = play_one_loop(pattern);

        let times: Vec<_> = backend.requests().iter().map(|r| r.time).collect();
        assert_eq!(times.len(), 16, "tempo {}", tempo);
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], step_interval(tempo), "tempo {}", tempo);
        }
    }
}

#[test]
fn test_tempo_change_keeps_elapsed_intervals() {
    let pattern = Pattern::new("Tempo").with_steps(TrackId::Kick, [true; 16]);
    let mut session = PlaybackSession::new(share_pattern(pattern), RecordingBackend::new());
    session.start(Duration::ZERO);

    // Four ticks at 120 BPM (125ms apart)
    session.run_until(Duration::from_millis(375));
    session.set_tempo(60, Duration::from_millis(375));
    session.run_until(Duration::from_millis(1_375));

    let times: Vec<_> = session.backend().requests().iter().map(|r| r.time).collect();
    let ms = |v: u64| Duration::from_millis(v);
    assert_eq!(
        times,
        vec![ms(0), ms(125), ms(250), ms(375), ms(625), ms(875), ms(1_125), ms(1_375)]
    );
}

#[test]
fn test_nth_fire_uses_cursor_n() {
    let mut rng = StdRng::seed_from_u64(0xBEA7);

    for _ in 0..50 {
        let pattern = random_pattern(&mut rng);
        let row = SCALE_TABLE[pattern.key().root().semitone() as usize];
        let melody_active = pattern.track(TrackId::Melody).active_count();
        let bass_active = pattern.track(TrackId::Bass).active_count();

        let backend = play_one_loop(pattern);

        let melody: Vec<_> = backend
            .requests_for(TrackId::Melody)
            .map(|r| r.pitch.unwrap())
            .collect();
        assert_eq!(melody.len(), melody_active);
        for (n, pitch) in melody.iter().enumerate() {
            assert_eq!(*pitch, row[n % 8]);
        }

        let bass: Vec<_> = backend
            .requests_for(TrackId::Bass)
            .map(|r| r.pitch.unwrap())
            .collect();
        assert_eq!(bass.len(), bass_active);
        for (n, pitch) in bass.iter().enumerate() {
            assert_eq!(*pitch, row[n % 8] - 12);
        }
    }
}

#[test]
fn test_live_and_export_agree_on_pitches() {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..25 {
        let pattern = random_pattern(&mut rng);
        let (drums, melodic) = PatternEncoder::new().schedule(&pattern).unwrap();
        let backend = play_one_loop(pattern);

        for track in [TrackId::Bass, TrackId::Melody] {
            let live: Vec<_> = backend
                .requests_for(track)
                .map(|r| (r.step, r.pitch.unwrap()))
                .collect();
            let exported: Vec<_> = melodic
                .iter()
                .filter(|e| e.track == track)
                .filter_map(|e| match e.event {
                    MidiEvent::NoteOn { note, .. } => Some((e.step, note)),
                    _ => None,
                })
                .collect();
            assert_eq!(live, exported);
        }

        let live_kicks: Vec<_> = backend
            .requests_for(TrackId::Kick)
            .map(|r| r.step)
            .collect();
        let exported_kicks: Vec<_> = drums
            .iter()
            .filter(|e| e.track == TrackId::Kick && e.event.is_note_on())
            .map(|e| e.step)
            .collect();
        assert_eq!(live_kicks, exported_kicks);
    }
}

#[test]
fn test_export_during_playback_leaves_cursors_alone() {
    let pattern = Pattern::new("Concurrent")
        .with_steps(TrackId::Melody, steps_from_str("xxxx------------").unwrap());
    let shared = share_pattern(pattern);
    let mut session = PlaybackSession::new(shared.clone(), RecordingBackend::new());
    session.start(Duration::ZERO);
    session.run_until(Duration::from_millis(125));
    assert_eq!(session.cursors().peek(TrackId::Melody), Some(2));

    let snapshot = shared.lock().unwrap().clone();
    PatternEncoder::new().encode(&snapshot).unwrap();

    assert_eq!(session.cursors().peek(TrackId::Melody), Some(2));
    session.run_until(Duration::from_millis(250));
    let last = session.backend().requests().last().unwrap().pitch;
    assert_eq!(last, Some(52));
}

#[test]
fn test_failures_never_stop_the_loop() {
    let pattern = Pattern::new("Flaky")
        .with_steps(TrackId::Kick, [true; 16])
        .with_steps(TrackId::Snare, [true; 16])
        .with_steps(TrackId::HihatClosed, [true; 16]);
    let backend = RecordingBackend::new().fail_on(TrackId::Snare);
    let mut session = PlaybackSession::new(share_pattern(pattern), backend);
    session.start(Duration::ZERO);

    let reports = session.run_until(Duration::from_millis(125 * 31));
    assert_eq!(reports.len(), 32);
    assert!(reports.iter().all(|r| r.failed == vec![TrackId::Snare]));
    assert_eq!(session.backend().rejected(), 32);
    assert_eq!(session.backend().requests_for(TrackId::HihatClosed).count(), 32);
    assert_eq!(session.state(), TransportState::Running);
}

#[test]
fn test_queue_backend_hands_off_in_order() {
    let pattern = Pattern::new("Queue")
        .with_steps(TrackId::Kick, steps_from_str("x---x---x---x---").unwrap())
        .with_steps(TrackId::HihatOpen, steps_from_str("--x---x---x---x-").unwrap());
    let (backend, mut consumer) = trigger_queue(64);
    let mut session = PlaybackSession::new(share_pattern(pattern), backend);
    session.start(Duration::ZERO);
    session.run_until(step_interval(120) * 15);

    let received: Vec<_> = std::iter::from_fn(|| consumer.try_pop())
        .map(|r| (r.step, r.track))
        .collect();
    assert_eq!(received.len(), 8);
    assert!(received.windows(2).all(|w| w[0].0 < w[1].0));
    assert_eq!(session.backend().dropped(), 0);
}

#[test]
fn test_observable_follows_session() {
    let pattern = Pattern::new("Observe").with_steps(TrackId::Kick, [true; 16]);
    let mut session = PlaybackSession::new(share_pattern(pattern), RecordingBackend::new());
    let observer = session.shared_state();

    session.start(Duration::ZERO);
    for step in 0..20u64 {
        session.run_until(Duration::from_millis(125 * step));
        let snapshot = observer.snapshot();
        assert_eq!(snapshot.current_step, Some((step % 16) as usize));
        assert_eq!(snapshot.ticks, step + 1);
    }

    session.start(Duration::from_secs(100));
    assert_eq!(observer.current_step(), None);
    session.stop();
    assert_eq!(observer.snapshot().state, TransportState::Stopped);
}
