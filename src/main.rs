// beatgrid - Command line front end

use anyhow::{Context, Result};
use beatgrid::config::Config;
use beatgrid::export::export_pattern;
use beatgrid::midi::smf::{self, TrackEvent};
use beatgrid::pattern::{Pattern, analyze};
use beatgrid::sequencer::notes::midi_note_name;
use beatgrid::sequencer::{Player, share_pattern};
use beatgrid::trigger::{LoggingBackend, TriggerBackend};
use beatgrid::{MidiEvent, PlaybackConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::thread;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "beatgrid", version, about = "16-step, 6-track beat sequencer")]
struct Cli {
    /// Config file (default: <config dir>/beatgrid/config.ron)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export a pattern to a Standard MIDI File
    Export {
        /// Pattern JSON file
        pattern: PathBuf,
        /// Output file or directory (default: current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Play a pattern in real time
    Play {
        /// Pattern JSON file
        pattern: PathBuf,
        /// Number of times to play the 16-step loop
        #[arg(long, default_value_t = 1)]
        loops: u32,
        /// Override the pattern tempo (BPM)
        #[arg(long)]
        tempo: Option<u32>,
        /// Send notes to the MIDI output port with this index
        #[cfg(feature = "midi-out")]
        #[arg(long)]
        midi_port: Option<usize>,
    },

    /// Report common issues in a pattern
    Analyze {
        /// Pattern JSON file
        pattern: PathBuf,
    },

    /// Print a starter pattern as JSON
    Template,

    /// Describe the contents of a MIDI file
    Inspect {
        /// MIDI file
        file: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(Cli::parse()) {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Export { pattern, output } => export(&pattern, output.as_deref(), &config),
        #[cfg(feature = "midi-out")]
        Command::Play {
            pattern,
            loops,
            tempo,
            midi_port,
        } => {
            let pattern = load_pattern_with_tempo(&pattern, tempo)?;
            match midi_port {
                Some(index) => {
                    let backend = beatgrid::midi::MidiOutputBackend::connect(index)?;
                    play(pattern, loops, &config.playback, backend);
                }
                None => play(pattern, loops, &config.playback, LoggingBackend::new()),
            }
            Ok(())
        }
        #[cfg(not(feature = "midi-out"))]
        Command::Play {
            pattern,
            loops,
            tempo,
        } => {
            let pattern = load_pattern_with_tempo(&pattern, tempo)?;
            play(pattern, loops, &config.playback, LoggingBackend::new());
            Ok(())
        }
        Command::Analyze { pattern } => {
            let pattern = load_pattern(&pattern)?;
            let report = analyze(&pattern);
            if report.is_clean() {
                println!("No issues found in \"{}\"", pattern.name());
            }
            for issue in &report.issues {
                println!("issue: {}", issue);
            }
            for suggestion in &report.suggestions {
                println!("suggestion: {}", suggestion);
            }
            Ok(())
        }
        Command::Template => {
            println!("{}", Pattern::default().to_json_pretty()?);
            Ok(())
        }
        Command::Inspect { file } => inspect(&file),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading config {}", path.display()))
        }
        None => match Config::default_path() {
            Some(path) => Config::load_or_default(&path)
                .with_context(|| format!("loading config {}", path.display())),
            None => Ok(Config::default()),
        },
    }
}

fn load_pattern(path: &Path) -> Result<Pattern> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading pattern {}", path.display()))?;
    Pattern::from_json(&json).with_context(|| format!("invalid pattern {}", path.display()))
}

fn load_pattern_with_tempo(path: &Path, tempo: Option<u32>) -> Result<Pattern> {
    let mut pattern = load_pattern(path)?;
    if let Some(tempo) = tempo {
        pattern.set_tempo(tempo)?;
    }
    Ok(pattern)
}

fn export(pattern_path: &Path, output: Option<&Path>, config: &Config) -> Result<()> {
    let pattern = load_pattern(pattern_path)?;
    let export = export_pattern(&pattern, &config.export)?;

    let path = match output {
        Some(path) if !path.is_dir() => {
            export.write_to(path)?;
            path.to_path_buf()
        }
        Some(dir) => export.write_to_dir(dir)?,
        None => export.write_to_dir(Path::new("."))?,
    };
    println!("Wrote {} ({} bytes)", path.display(), export.bytes.len());
    Ok(())
}

fn play<B: TriggerBackend + Send + 'static>(
    pattern: Pattern,
    loops: u32,
    config: &PlaybackConfig,
    backend: B,
) {
    let total_ticks = u64::from(loops.max(1)) * 16;
    let mut player = Player::new(share_pattern(pattern), config.clone());
    let state = player.shared_state();

    player.start(backend);
    loop {
        let snapshot = state.snapshot();
        if snapshot.ticks >= total_ticks {
            break;
        }
        // Player thread gone before finishing
        if snapshot.ticks > 0 && !snapshot.state.is_running() {
            break;
        }
        thread::sleep(config.poll_interval());
    }
    // Let the last step ring for its full length
    let tempo = state.tempo();
    thread::sleep(beatgrid::sequencer::step_interval(tempo));
    player.stop();
}

fn inspect(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let parsed = smf::parse(&bytes).with_context(|| format!("parsing {}", path.display()))?;

    println!(
        "format {}, {} track(s), {} ticks per quarter",
        parsed.header.format, parsed.header.track_count, parsed.header.division
    );
    for (index, track) in parsed.tracks.iter().enumerate() {
        let name = track.name().unwrap_or("(unnamed)");
        let bpm = track
            .tempo()
            .map(|micros| format!("{:.1} BPM", 60_000_000.0 / f64::from(micros.max(1))))
            .unwrap_or_else(|| "no tempo".to_string());
        println!(
            "track {}: {} | {} | {} note-ons | ends at tick {}",
            index,
            name,
            bpm,
            track.note_on_count(),
            track.end_tick()
        );

        for event in &track.events {
            match &event.event {
                TrackEvent::Midi(MidiEvent::NoteOn {
                    channel,
                    note,
                    velocity,
                }) => println!(
                    "  {:>6}  ch{:<2} on  {:<4} vel {}",
                    event.tick,
                    channel + 1,
                    midi_note_name(*note),
                    velocity
                ),
                TrackEvent::Midi(MidiEvent::NoteOff { channel, note, .. }) => println!(
                    "  {:>6}  ch{:<2} off {}",
                    event.tick,
                    channel + 1,
                    midi_note_name(*note)
                ),
                TrackEvent::Midi(MidiEvent::ProgramChange { channel, program }) => println!(
                    "  {:>6}  ch{:<2} program {}",
                    event.tick,
                    channel + 1,
                    program
                ),
                _ => {}
            }
        }
    }
    Ok(())
}
