// Transport - Playback sessions, the shared step observable and the player thread
// A session ties one step clock to one dispatcher; the player drives a
// session on its own thread and talks to it through a lock-free queue.

use super::clock::{StepClock, TransportState};
use super::dispatcher::{TickReport, TriggerDispatcher};
use super::notes::NoteCursors;
use crate::config::PlaybackConfig;
use crate::pattern::{DEFAULT_TEMPO, PLAYABLE_TEMPO_MAX, PLAYABLE_TEMPO_MIN, Pattern};
use crate::trigger::TriggerBackend;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Pattern shared between the editor side and the playback thread
pub type SharedPattern = Arc<Mutex<Pattern>>;

/// Wrap a pattern for sharing
pub fn share_pattern(pattern: Pattern) -> SharedPattern {
    Arc::new(Mutex::new(pattern))
}

/// Lock a shared pattern, recovering from a poisoned lock
pub fn lock_pattern(pattern: &SharedPattern) -> MutexGuard<'_, Pattern> {
    pattern.lock().unwrap_or_else(PoisonError::into_inner)
}

const NO_STEP: isize = -1;

/// Shared transport state
/// Thread-safe via atomics so a UI can poll it while the player runs
#[derive(Debug)]
pub struct SharedTransportState {
    running: AtomicBool,
    current_step: AtomicIsize,
    tempo: AtomicU32,
    ticks: AtomicU64,
    last_tick_nanos: AtomicU64,
}

/// Point-in-time copy of the shared transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSnapshot {
    pub state: TransportState,
    /// Step of the last published tick, `None` when nothing is highlighted
    pub current_step: Option<usize>,
    pub tempo: u32,
    /// Ticks published since the session started
    pub ticks: u64,
    /// Scheduled time of the last published tick
    pub last_tick: Duration,
}

impl SharedTransportState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> TransportState {
        if self.running.load(Ordering::Acquire) {
            TransportState::Running
        } else {
            TransportState::Stopped
        }
    }

    pub fn current_step(&self) -> Option<usize> {
        let step = self.current_step.load(Ordering::Acquire);
        usize::try_from(step).ok()
    }

    pub fn tempo(&self) -> u32 {
        self.tempo.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            state: self.state(),
            current_step: self.current_step(),
            tempo: self.tempo(),
            ticks: self.ticks.load(Ordering::Relaxed),
            last_tick: Duration::from_nanos(self.last_tick_nanos.load(Ordering::Relaxed)),
        }
    }

    fn begin(&self, tempo: u32) {
        self.tempo.store(tempo, Ordering::Relaxed);
        self.ticks.store(0, Ordering::Relaxed);
        self.last_tick_nanos.store(0, Ordering::Relaxed);
        self.current_step.store(NO_STEP, Ordering::Release);
        self.running.store(true, Ordering::Release);
    }

    fn end(&self) {
        self.running.store(false, Ordering::Release);
        self.clear_step();
    }

    fn set_tempo(&self, tempo: u32) {
        self.tempo.store(tempo, Ordering::Relaxed);
    }

    /// Publish the step of a tick that has just been dispatched
    pub(crate) fn publish_tick(&self, step: usize, time: Duration) {
        let nanos = u64::try_from(time.as_nanos()).unwrap_or(u64::MAX);
        self.last_tick_nanos.store(nanos, Ordering::Relaxed);
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.current_step.store(step as isize, Ordering::Release);
    }

    /// Reset the step observable to "no step"
    pub fn clear_step(&self) {
        self.current_step.store(NO_STEP, Ordering::Release);
    }
}

impl Default for SharedTransportState {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(false),
            current_step: AtomicIsize::new(NO_STEP),
            tempo: AtomicU32::new(DEFAULT_TEMPO),
            ticks: AtomicU64::new(0),
            last_tick_nanos: AtomicU64::new(0),
        }
    }
}

/// One live playback session
///
/// Times passed in are offsets on the session's own transport timeline.
/// Every `start` begins with a fresh clock and a fresh cursor map.
pub struct PlaybackSession<B> {
    pattern: SharedPattern,
    clock: StepClock,
    dispatcher: TriggerDispatcher<B>,
    shared_state: Arc<SharedTransportState>,
}

impl<B: TriggerBackend> PlaybackSession<B> {
    pub fn new(pattern: SharedPattern, backend: B) -> Self {
        Self::with_shared_state(pattern, backend, SharedTransportState::new())
    }

    /// Create with existing shared state (for observers on other threads)
    pub fn with_shared_state(
        pattern: SharedPattern,
        backend: B,
        shared_state: Arc<SharedTransportState>,
    ) -> Self {
        let tempo = lock_pattern(&pattern).playable_tempo();
        Self {
            pattern,
            clock: StepClock::new(tempo),
            dispatcher: TriggerDispatcher::new(backend),
            shared_state,
        }
    }

    pub fn shared_state(&self) -> Arc<SharedTransportState> {
        Arc::clone(&self.shared_state)
    }

    pub fn pattern(&self) -> SharedPattern {
        Arc::clone(&self.pattern)
    }

    pub fn state(&self) -> TransportState {
        self.clock.state()
    }

    pub fn clock(&self) -> &StepClock {
        &self.clock
    }

    pub fn cursors(&self) -> &NoteCursors {
        self.dispatcher.cursors()
    }

    pub fn backend(&self) -> &B {
        self.dispatcher.backend()
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.dispatcher.backend_mut()
    }

    pub fn into_backend(self) -> B {
        self.dispatcher.into_backend()
    }

    /// Start playback at `now`. Starting a running session restarts it.
    pub fn start(&mut self, now: Duration) {
        if self.clock.state().is_running() {
            self.stop();
        }
        let tempo = lock_pattern(&self.pattern).playable_tempo();
        self.clock = StepClock::new(tempo);
        self.dispatcher.reset();
        self.clock.start(now);
        self.shared_state.begin(tempo);
        tracing::info!(tempo, "playback started");
    }

    /// Stop playback; no further ticks are dispatched
    pub fn stop(&mut self) {
        if !self.clock.state().is_running() {
            return;
        }
        self.clock.stop();
        self.shared_state.end();
        tracing::info!("playback stopped");
    }

    /// Change tempo at `now`
    ///
    /// The value is clamped into the playable range and written to the
    /// pattern as well, so later duration hints use it.
    pub fn set_tempo(&mut self, bpm: u32, now: Duration) {
        let tempo = bpm.clamp(PLAYABLE_TEMPO_MIN, PLAYABLE_TEMPO_MAX);
        if let Err(e) = lock_pattern(&self.pattern).set_tempo(tempo) {
            tracing::warn!(tempo, error = %e, "tempo not written to pattern");
        }
        self.apply_tempo(tempo, now);
    }

    fn apply_tempo(&mut self, tempo: u32, now: Duration) {
        if tempo == self.clock.tempo() {
            return;
        }
        self.clock.set_tempo(tempo, now);
        self.shared_state.set_tempo(tempo);
        tracing::debug!(tempo, "tempo changed");
    }

    /// Dispatch at most one due tick
    ///
    /// The backend is polled first, whether or not a tick is due. The step
    /// observable is published after the tick's triggers have been
    /// handed to the backend.
    pub fn tick(&mut self, now: Duration) -> Option<TickReport> {
        if !self.clock.state().is_running() {
            return None;
        }

        self.dispatcher.poll(now);

        // Tempo edits made directly on the shared pattern
        let pattern_tempo = lock_pattern(&self.pattern).playable_tempo();
        self.apply_tempo(pattern_tempo, now);

        let tick = self.clock.poll(now)?;
        let report = {
            let pattern = lock_pattern(&self.pattern);
            self.dispatcher.dispatch(&tick, &pattern)
        };
        self.shared_state.publish_tick(tick.step, tick.time);
        Some(report)
    }

    /// Dispatch every tick due at `now`, in order
    pub fn run_until(&mut self, now: Duration) -> Vec<TickReport> {
        std::iter::from_fn(|| self.tick(now)).collect()
    }

    pub fn time_until_next_tick(&self, now: Duration) -> Option<Duration> {
        self.clock.time_until_next(now)
    }
}

/// Commands sent to the player thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    SetTempo(u32),
}

pub type PlayerCommandProducer = ringbuf::HeapProd<PlayerCommand>;
pub type PlayerCommandConsumer = ringbuf::HeapCons<PlayerCommand>;

pub fn create_player_channel(capacity: usize) -> (PlayerCommandProducer, PlayerCommandConsumer) {
    let rb = HeapRb::<PlayerCommand>::new(capacity.max(1));
    rb.split()
}

/// Marks the transport stopped when the player thread exits, unwinding included
struct StopOnExit(Arc<SharedTransportState>);

impl Drop for StopOnExit {
    fn drop(&mut self) {
        self.0.end();
    }
}

struct Worker<B> {
    handle: thread::JoinHandle<B>,
    cancel: Arc<AtomicBool>,
    commands: PlayerCommandProducer,
}

/// Runs a playback session on a dedicated thread
pub struct Player<B: TriggerBackend + Send + 'static> {
    pattern: SharedPattern,
    shared_state: Arc<SharedTransportState>,
    config: PlaybackConfig,
    worker: Option<Worker<B>>,
}

impl<B: TriggerBackend + Send + 'static> Player<B> {
    pub fn new(pattern: SharedPattern, config: PlaybackConfig) -> Self {
        Self {
            pattern,
            shared_state: SharedTransportState::new(),
            config,
            worker: None,
        }
    }

    pub fn pattern(&self) -> SharedPattern {
        Arc::clone(&self.pattern)
    }

    pub fn shared_state(&self) -> Arc<SharedTransportState> {
        Arc::clone(&self.shared_state)
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        self.shared_state.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Start playback with `backend`
    ///
    /// A running player is stopped first; its backend is returned.
    pub fn start(&mut self, backend: B) -> Option<B> {
        let previous = self.stop();

        let cancel = Arc::new(AtomicBool::new(false));
        let (commands, mut inbox) = create_player_channel(self.config.queue_capacity);
        let poll_interval = self.config.poll_interval();

        let mut session = PlaybackSession::with_shared_state(
            Arc::clone(&self.pattern),
            backend,
            Arc::clone(&self.shared_state),
        );
        let thread_cancel = Arc::clone(&cancel);

        let handle = thread::spawn(move || {
            let _stop_on_exit = StopOnExit(session.shared_state());
            let origin = Instant::now();
            session.start(Duration::ZERO);

            'run: loop {
                let now = origin.elapsed();

                while let Some(command) = inbox.try_pop() {
                    match command {
                        PlayerCommand::SetTempo(bpm) => session.set_tempo(bpm, now),
                    }
                }

                loop {
                    if thread_cancel.load(Ordering::Acquire) {
                        break 'run;
                    }
                    if session.tick(now).is_none() {
                        break;
                    }
                }

                let wait = session
                    .time_until_next_tick(origin.elapsed())
                    .unwrap_or(poll_interval)
                    .min(poll_interval);
                if !wait.is_zero() {
                    thread::sleep(wait);
                }
            }

            session.stop();
            session.into_backend()
        });

        self.worker = Some(Worker {
            handle,
            cancel,
            commands,
        });
        previous
    }

    /// Stop playback and hand the backend back
    ///
    /// Returns `None` if the player was not running or its thread panicked.
    pub fn stop(&mut self) -> Option<B> {
        let worker = self.worker.take()?;
        worker.cancel.store(true, Ordering::Release);

        match worker.handle.join() {
            Ok(backend) => Some(backend),
            Err(_) => {
                tracing::error!("player thread panicked");
                self.shared_state.end();
                None
            }
        }
    }

    /// Change tempo; takes effect on the running thread without a restart
    pub fn set_tempo(&mut self, bpm: u32) {
        let tempo = bpm.clamp(PLAYABLE_TEMPO_MIN, PLAYABLE_TEMPO_MAX);
        if let Err(e) = lock_pattern(&self.pattern).set_tempo(tempo) {
            tracing::warn!(tempo, error = %e, "tempo not written to pattern");
        }
        if let Some(worker) = self.worker.as_mut() {
            if worker.commands.try_push(PlayerCommand::SetTempo(tempo)).is_err() {
                tracing::warn!(tempo, "player command queue full");
            }
        }
    }
}

impl<B: TriggerBackend + Send + 'static> Drop for Player<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
