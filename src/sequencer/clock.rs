// Step clock - Sixteenth-note transport scheduler
// Holds a single "next deadline" on the transport timeline. Callers pass in
// the current transport time; the clock never reads a wall clock itself.

use crate::pattern::STEPS_PER_PATTERN;
use std::time::Duration;

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Running,
}

impl TransportState {
    pub fn is_running(&self) -> bool {
        matches!(self, TransportState::Running)
    }
}

/// One clock pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Step position 0..15
    pub step: usize,
    /// Scheduled transport time of this tick
    pub time: Duration,
    /// Sequence number since the clock was started
    pub index: u64,
}

/// Interval between two steps: one sixteenth note, `60 / tempo / 4` seconds
pub fn step_interval(tempo: u32) -> Duration {
    Duration::from_secs_f64(60.0 / f64::from(tempo.max(1)) / 4.0)
}

/// Step clock
///
/// Emits one tick per step interval while running, cycling through the
/// sixteen step positions. Ticks are handed out strictly in order: if the
/// caller falls behind, the missed ticks come out one by one, each carrying
/// its own scheduled time.
#[derive(Debug, Clone)]
pub struct StepClock {
    state: TransportState,
    tempo: u32,
    interval: Duration,
    position: usize,
    next_deadline: Option<Duration>,
    ticks_emitted: u64,
}

impl StepClock {
    pub fn new(tempo: u32) -> Self {
        let tempo = tempo.max(1);
        Self {
            state: TransportState::Stopped,
            tempo,
            interval: step_interval(tempo),
            position: 0,
            next_deadline: None,
            ticks_emitted: 0,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    /// Current step interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Step the next tick will carry
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.next_deadline
    }

    pub fn ticks_emitted(&self) -> u64 {
        self.ticks_emitted
    }

    /// Start at `now`; the first tick (step 0) is due immediately.
    /// Starting a running clock stops it first.
    pub fn start(&mut self, now: Duration) {
        if self.state.is_running() {
            self.stop();
        }
        self.interval = step_interval(self.tempo);
        self.position = 0;
        self.ticks_emitted = 0;
        self.next_deadline = Some(now);
        self.state = TransportState::Running;
    }

    /// Stop and drop the pending deadline
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.next_deadline = None;
        self.position = 0;
    }

    /// Change tempo at transport time `now`
    ///
    /// Ticks already emitted keep their times. The part of the current
    /// interval that has not elapsed yet is rescaled to the new rate, and
    /// every later interval uses the new tempo.
    pub fn set_tempo(&mut self, tempo: u32, now: Duration) {
        let tempo = tempo.max(1);
        if tempo == self.tempo {
            return;
        }
        let new_interval = step_interval(tempo);

        if let Some(deadline) = self.next_deadline {
            if deadline > now {
                let remaining = (deadline - now).as_secs_f64() / self.interval.as_secs_f64();
                self.next_deadline = Some(now + new_interval.mul_f64(remaining.min(1.0)));
            }
        }

        self.tempo = tempo;
        self.interval = new_interval;
    }

    /// Emit the next tick if it is due at `now`
    pub fn poll(&mut self, now: Duration) -> Option<Tick> {
        if !self.state.is_running() {
            return None;
        }
        let deadline = self.next_deadline?;
        if now < deadline {
            return None;
        }

        let tick = Tick {
            step: self.position,
            time: deadline,
            index: self.ticks_emitted,
        };

        self.position = (self.position + 1) % STEPS_PER_PATTERN;
        self.ticks_emitted += 1;
        self.next_deadline = Some(deadline + self.interval);

        Some(tick)
    }

    /// Time left until the next tick (zero if one is already due)
    pub fn time_until_next(&self, now: Duration) -> Option<Duration> {
        self.next_deadline.map(|d| d.saturating_sub(now))
    }
}
