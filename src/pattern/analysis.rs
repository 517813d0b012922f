// Beat analysis - Simple groove heuristics over a pattern

use super::types::{Pattern, TrackId};

/// Kick patterns busier than this are flagged
const BUSY_KICK_STEPS: usize = 8;

/// Tempo bounds outside of which a warning is raised (BPM)
const SLOW_TEMPO: u32 = 60;
const FAST_TEMPO: u32 = 200;

/// Result of analysing a pattern
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BeatAnalysis {
    /// Problems worth fixing
    pub issues: Vec<String>,
    /// Optional improvements
    pub suggestions: Vec<String>,
}

impl BeatAnalysis {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.suggestions.is_empty()
    }
}

/// Analyse a pattern and report quality issues and suggestions
pub fn analyze(pattern: &Pattern) -> BeatAnalysis {
    let mut analysis = BeatAnalysis::default();

    let kick_count = pattern.track(TrackId::Kick).active_count();
    if kick_count == 0 {
        analysis
            .issues
            .push("No kick drum pattern detected".to_string());
    } else if kick_count > BUSY_KICK_STEPS {
        analysis
            .issues
            .push("Kick drum pattern may be too busy".to_string());
        analysis
            .suggestions
            .push("Try a simpler kick pattern for better groove".to_string());
    }

    // Backbeat: steps 4 and 12 are beats 2 and 4 of the bar
    let snare = pattern.track(TrackId::Snare);
    if !snare.is_active(4) && !snare.is_active(12) {
        analysis
            .suggestions
            .push("Consider placing snare on beats 2 and 4 for more groove".to_string());
    }

    let tempo = pattern.tempo();
    if tempo < SLOW_TEMPO {
        analysis
            .issues
            .push("BPM is very slow - consider increasing it".to_string());
    } else if tempo > FAST_TEMPO {
        analysis
            .issues
            .push("BPM is very fast - consider slowing down".to_string());
    }

    analysis
}
