//! Edge case tests and robustness validation
//!
//! Malformed patterns must be rejected before anything is scheduled or
//! encoded; odd but legal input must play and export without surprises.

use beatgrid::export::{ExportError, PatternEncoder, export_json};
use beatgrid::config::ExportConfig;
use beatgrid::midi::smf::parse;
use beatgrid::pattern::{Key, Mode, Pattern, PatternError, PitchClass, TrackId};
use beatgrid::sequencer::{PlaybackSession, StepClock, share_pattern};
use beatgrid::trigger::RecordingBackend;
use serde_json::{Value, json};
use std::time::Duration;

fn track_json(id: &str) -> Value {
    json!({
        "id": id,
        "name": id,
        "color": "#ffffff",
        "steps": [true, false, false, false, true, false, false, false,
                  true, false, false, false, true, false, false, false],
        "volume": 0.8
    })
}

fn pattern_json(tracks: Vec<Value>) -> Value {
    json!({
        "tempo": 120,
        "name": "Edge",
        "description": "",
        "key": "C minor",
        "tracks": tracks
    })
}

fn all_tracks() -> Vec<Value> {
    ["kick", "snare", "hihat_closed", "hihat_open", "bass", "melody"]
        .into_iter()
        .map(track_json)
        .collect()
}

/// Test that every structural defect is reported as a pattern error
#[test]
fn test_malformed_patterns_rejected() {
    let mut short = all_tracks();
    short[4]["steps"] = json!([true, false, true]);
    assert!(matches!(
        Pattern::from_json(&pattern_json(short).to_string()),
        Err(PatternError::WrongStepCount { track: TrackId::Bass, found: 3, .. })
    ));

    let mut missing_steps = all_tracks();
    missing_steps[0].as_object_mut().unwrap().remove("steps");
    assert!(matches!(
        Pattern::from_json(&pattern_json(missing_steps).to_string()),
        Err(PatternError::WrongStepCount { track: TrackId::Kick, found: 0, .. })
    ));

    let mut unknown = all_tracks();
    unknown[2]["id"] = json!("cowbell");
    assert!(matches!(
        Pattern::from_json(&pattern_json(unknown).to_string()),
        Err(PatternError::UnknownTrack(_))
    ));

    let mut duplicate = all_tracks();
    duplicate[5]["id"] = json!("bass");
    assert!(matches!(
        Pattern::from_json(&pattern_json(duplicate).to_string()),
        Err(PatternError::DuplicateTrack(TrackId::Bass))
    ));

    let mut five = all_tracks();
    five.pop();
    assert!(matches!(
        Pattern::from_json(&pattern_json(five).to_string()),
        Err(PatternError::WrongTrackCount { expected: 6, found: 5 })
    ));

    let mut too_fast = pattern_json(all_tracks());
    too_fast["tempo"] = json!(1500);
    assert!(matches!(
        Pattern::from_json(&too_fast.to_string()),
        Err(PatternError::TempoOutOfRange(1500))
    ));

    assert!(matches!(
        Pattern::from_json("{not json"),
        Err(PatternError::Json(_))
    ));
}

/// Test that a malformed pattern never reaches the encoder
#[test]
fn test_export_of_malformed_json_fails_whole() {
    let mut tracks = all_tracks();
    tracks[1]["steps"] = json!([]);
    let result = export_json(&pattern_json(tracks).to_string(), &ExportConfig::default());
    assert!(matches!(result, Err(ExportError::Pattern(_))));
}

/// Test tracks supplied out of order land in canonical order
#[test]
fn test_tracks_reordered_to_canonical_order() {
    let mut tracks = all_tracks();
    tracks.reverse();
    let pattern = Pattern::from_json(&pattern_json(tracks).to_string()).unwrap();

    let ids: Vec<_> = pattern.tracks().iter().map(|t| t.id()).collect();
    assert_eq!(ids, TrackId::ALL.to_vec());
}

/// Test out-of-range volumes are clamped into [0, 1]
#[test]
fn test_volume_clamped() {
    let mut tracks = all_tracks();
    tracks[0]["volume"] = json!(3.5);
    tracks[1]["volume"] = json!(-1.0);
    let pattern = Pattern::from_json(&pattern_json(tracks).to_string()).unwrap();

    assert_eq!(pattern.track(TrackId::Kick).volume(), 1.0);
    assert_eq!(pattern.track(TrackId::Snare).volume(), 0.0);

    let mut pattern = Pattern::default();
    assert!(matches!(
        pattern.set_volume(TrackId::Bass, f32::NAN),
        Err(PatternError::InvalidVolume(TrackId::Bass))
    ));
    assert!(pattern.set_volume(TrackId::Bass, f32::INFINITY).is_err());
}

/// Test the generated-pattern field name `bpm` is accepted for tempo
#[test]
fn test_bpm_alias() {
    let mut value = pattern_json(all_tracks());
    let object = value.as_object_mut().unwrap();
    object.remove("tempo");
    object.insert("bpm".to_string(), json!(95));
    let pattern = Pattern::from_json(&value.to_string()).unwrap();
    assert_eq!(pattern.tempo(), 95);
}

/// Test extreme accepted tempos are clamped to the playable range
#[test]
fn test_extreme_tempos_clamped_for_playback() {
    for (tempo, playable) in [(20, 40), (39, 40), (221, 220), (999, 220)] {
        let pattern = Pattern::new("Extreme").with_tempo(tempo).unwrap();
        assert_eq!(pattern.playable_tempo(), playable);

        let mut session = PlaybackSession::new(share_pattern(pattern.clone()), RecordingBackend::new());
        session.start(Duration::ZERO);
        assert_eq!(session.clock().tempo(), playable);

        let parsed = parse(&PatternEncoder::new().encode(&pattern).unwrap()).unwrap();
        assert_eq!(parsed.tracks[0].tempo(), Some(60_000_000 / playable));
    }
}

/// Test key spellings
#[test]
fn test_key_spellings() {
    assert_eq!(Key::parse("Bb major").root(), PitchClass::ASharp);
    assert_eq!(Key::parse("Cb minor").root(), PitchClass::B);
    assert_eq!(Key::parse("F# MINOR").root(), PitchClass::FSharp);
    assert_eq!(Key::parse("F# MINOR").mode(), Mode::Minor);
    assert_eq!(Key::parse("G maj").mode(), Mode::Major);
    assert_eq!(Key::parse("E").mode(), Mode::Minor);
    assert_eq!(Key::parse("").root(), PitchClass::C);
    assert_eq!(Key::parse("H dorian").root(), PitchClass::C);
}

/// Test a stopped clock never emits, however far time advances
#[test]
fn test_clock_far_future_poll() {
    let mut clock = StepClock::new(120);
    assert!(clock.poll(Duration::from_secs(u32::MAX as u64)).is_none());

    clock.start(Duration::ZERO);
    clock.stop();
    assert!(clock.poll(Duration::from_secs(3_600)).is_none());
}

/// Test double start and double stop are harmless
#[test]
fn test_session_reentrant_start_and_stop() {
    let pattern = Pattern::new("Twice").with_steps(TrackId::Kick, [true; 16]);
    let mut session = PlaybackSession::new(share_pattern(pattern), RecordingBackend::new());

    session.stop();
    session.start(Duration::ZERO);
    session.run_until(Duration::from_millis(500));
    session.start(Duration::from_millis(500));
    session.start(Duration::from_millis(500));

    let report = session.tick(Duration::from_millis(500)).unwrap();
    assert_eq!(report.tick.step, 0);
    assert_eq!(report.tick.index, 0);

    session.stop();
    session.stop();
    assert!(session.tick(Duration::from_secs(10)).is_none());
}

/// Test editing the pattern between ticks is picked up on the next tick
#[test]
fn test_live_edits_apply_on_next_tick() {
    let shared = share_pattern(Pattern::new("Live"));
    let mut session = PlaybackSession::new(shared.clone(), RecordingBackend::new());
    session.start(Duration::ZERO);

    let first = session.tick(Duration::ZERO).unwrap();
    assert!(first.fired.is_empty());

    shared.lock().unwrap().set_step(TrackId::Snare, 1, true).unwrap();
    let second = session.tick(Duration::from_millis(125)).unwrap();
    assert_eq!(second.fired, vec![TrackId::Snare]);
}
