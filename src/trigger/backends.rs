// Trigger backends - Recording and logging implementations

use super::{TriggerBackend, TriggerError, TriggerRequest};
use crate::pattern::TrackId;
use std::collections::HashSet;
use std::time::Duration;

/// Backend that records every request it accepts
///
/// Tracks registered with `fail_on` are rejected with a backend error
/// instead, which makes failure isolation observable in tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingBackend {
    requests: Vec<TriggerRequest>,
    failing: HashSet<TrackId>,
    rejected: usize,
    last_poll: Option<Duration>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every request for `track`
    pub fn fail_on(mut self, track: TrackId) -> Self {
        self.failing.insert(track);
        self
    }

    /// Accepted requests, in arrival order
    pub fn requests(&self) -> &[TriggerRequest] {
        &self.requests
    }

    /// Accepted requests for one track
    pub fn requests_for(&self, track: TrackId) -> impl Iterator<Item = &TriggerRequest> {
        self.requests.iter().filter(move |r| r.track == track)
    }

    /// Number of rejected requests
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Transport time of the most recent poll
    pub fn last_poll(&self) -> Option<Duration> {
        self.last_poll
    }

    /// Take the recorded requests, leaving the backend empty
    pub fn take(&mut self) -> Vec<TriggerRequest> {
        std::mem::take(&mut self.requests)
    }
}

impl TriggerBackend for RecordingBackend {
    fn trigger(&mut self, request: &TriggerRequest) -> Result<(), TriggerError> {
        if self.failing.contains(&request.track) {
            self.rejected += 1;
            return Err(TriggerError::Backend(format!(
                "{} voice unavailable",
                request.track
            )));
        }
        self.requests.push(request.clone());
        Ok(())
    }

    fn poll(&mut self, now: Duration) -> Result<(), TriggerError> {
        self.last_poll = Some(now);
        Ok(())
    }
}

/// Backend that only emits a structured log event per trigger
#[derive(Debug, Default)]
pub struct LoggingBackend {
    triggered: u64,
}

impl LoggingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn triggered(&self) -> u64 {
        self.triggered
    }
}

impl TriggerBackend for LoggingBackend {
    fn trigger(&mut self, request: &TriggerRequest) -> Result<(), TriggerError> {
        self.triggered += 1;
        tracing::info!(
            track = %request.track,
            step = request.step,
            pitch = ?request.pitch,
            gain_db = request.gain_db,
            at_ms = request.time.as_millis() as u64,
            "trigger"
        );
        Ok(())
    }
}
