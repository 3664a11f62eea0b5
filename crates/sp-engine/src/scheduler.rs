//! Playback state machine.
//!
//! The scheduler owns the loaded song and drives an [`OutputQueue`]:
//! each `play` spawns one submission worker that feeds the queue every
//! event from the start tick onwards, in tick order, followed by a stop
//! directive at the end of the song. Pause, seek and stop cancel the
//! worker, empty the queue backlog and send the Panic burst before
//! changing state.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use log::{debug, info, warn};
use sp_ir::Song;
use thiserror::Error;

use crate::chase::chase_events;
use crate::messages::{master_volume_sysex, panic_burst};
use crate::traits::{Destination, DirectMessage, OutputQueue, QueueError};

/// Transport status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Stopped => "stopped",
            Status::Playing => "playing",
            Status::Paused => "paused",
        })
    }
}

/// Mutable playback state, only changed by scheduler transitions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub status: Status,
    /// Last tick captured from or sent to the queue
    pub current_tick: u64,
    /// Start tick of the active submission pass
    pub started_at_tick: u64,
}

/// Scheduler settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Port every event is addressed to
    pub destination: Destination,
    /// Restore programs and controllers when starting mid-song
    pub chase_controls: bool,
}

/// Error type for playback control.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("no song loaded")]
    NoSong,
    #[error("cannot {op} while {state}")]
    InvalidState { op: &'static str, state: Status },
    /// The queue failed; the scheduler is now stopped
    #[error("queue {op} failed at tick {tick}: {source}")]
    Queue {
        op: &'static str,
        tick: u64,
        source: QueueError,
    },
    /// The submission worker could not run or panicked
    #[error("submission worker failed: {0}")]
    Worker(String),
}

/// Shared flag telling a submission worker to stop.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How a submission pass ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Everything was submitted and the queue drained
    Completed { submitted: usize },
    /// The pass was cancelled before finishing
    Cancelled,
}

type PassResult = Result<SubmitOutcome, PlaybackError>;

struct Worker {
    cancel: CancelToken,
    handle: JoinHandle<()>,
    outcome: Receiver<PassResult>,
}

/// One submission pass, run on the worker thread.
struct Pass<Q: ?Sized> {
    queue: Arc<Q>,
    song: Arc<Song>,
    dest: Destination,
    from: u64,
    chase: bool,
    cancel: CancelToken,
}

impl<Q: OutputQueue + ?Sized> Pass<Q> {
    fn run(&self) -> PassResult {
        let chased = if self.chase && self.from > 0 {
            chase_events(&self.song.events, self.from)
        } else {
            Vec::new()
        };
        if !chased.is_empty() {
            debug!("chasing {} controller/program events", chased.len());
        }

        let events = self.song.events_from(self.from).iter().filter(|e| !e.is_end_of_track());
        let mut submitted = 0;
        for event in chased.iter().chain(events) {
            if self.cancel.is_cancelled() {
                return Ok(SubmitOutcome::Cancelled);
            }
            if let Err(source) = self.queue.submit(self.dest, event) {
                return self.failure("submit", event.tick, source);
            }
            submitted += 1;
        }

        if self.cancel.is_cancelled() {
            return Ok(SubmitOutcome::Cancelled);
        }
        let end = self.song.total_ticks;
        if let Err(source) = self.queue.schedule_stop(end) {
            return self.failure("schedule_stop", end, source);
        }
        if let Err(source) = self.queue.drain() {
            return self.failure("drain", end, source);
        }
        debug!("submitted {} events from tick {}", submitted, self.from);
        Ok(SubmitOutcome::Completed { submitted })
    }

    /// A queue error after cancellation is part of being interrupted.
    fn failure(&self, op: &'static str, tick: u64, source: QueueError) -> PassResult {
        if self.cancel.is_cancelled() {
            Ok(SubmitOutcome::Cancelled)
        } else {
            Err(PlaybackError::Queue { op, tick, source })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Drives one song through an output queue.
pub struct Scheduler<Q: OutputQueue + 'static> {
    queue: Arc<Q>,
    config: SchedulerConfig,
    song: Option<Arc<Song>>,
    state: PlaybackState,
    worker: Option<Worker>,
}

impl<Q: OutputQueue + 'static> Scheduler<Q> {
    pub fn new(queue: Arc<Q>, config: SchedulerConfig) -> Self {
        Self {
            queue,
            config,
            song: None,
            state: PlaybackState::default(),
            worker: None,
        }
    }

    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Takes effect on the next `play`.
    pub fn set_chase_controls(&mut self, enabled: bool) {
        self.config.chase_controls = enabled;
    }

    pub fn song(&self) -> Option<&Arc<Song>> {
        self.song.as_ref()
    }

    pub fn state(&self) -> Status {
        self.state.status
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state
    }

    // --- Song management ---

    /// Load a song. Only valid while stopped.
    pub fn open(&mut self, song: Arc<Song>) -> Result<(), PlaybackError> {
        self.require("open", &[Status::Stopped])?;
        let division = song.division;
        self.queue_op("set_resolution", 0, |q| q.set_resolution(division))?;
        info!(
            "opened \"{}\": {} events, {} ticks, {:.2}s",
            song.title,
            song.events.len(),
            song.total_ticks,
            song.duration_seconds
        );
        self.song = Some(song);
        self.state = PlaybackState::default();
        Ok(())
    }

    /// Stop and unload the song. The song is unloaded even if stopping fails.
    pub fn close(&mut self) -> Result<(), PlaybackError> {
        let result = self.stop();
        self.song = None;
        result
    }

    // --- Transport ---

    /// Start playback at `from_tick` (clamped to the song length).
    pub fn play(&mut self, from_tick: u64) -> Result<(), PlaybackError> {
        self.require("play", &[Status::Stopped, Status::Paused])?;
        let song = self.song.clone().ok_or(PlaybackError::NoSong)?;
        let from = from_tick.min(song.total_ticks);
        let resuming = self.state.status == Status::Paused;

        self.queue_op("reset_position", from, |q| q.reset_position(from))?;
        let tempo = song.tempo_map.tempo_at(from);
        self.queue_op("set_tempo", from, |q| q.set_tempo(tempo))?;
        if resuming {
            self.queue_op("continue", from, |q| q.continue_from(from))?;
        } else {
            self.queue_op("start", from, |q| q.start())?;
        }

        self.spawn_worker(song, from)?;
        self.state = PlaybackState {
            status: Status::Playing,
            current_tick: from,
            started_at_tick: from,
        };
        info!("playing from tick {}", from);
        Ok(())
    }

    /// Freeze playback at the queue's current tick.
    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        self.require("pause", &[Status::Playing])?;
        let last = self.state.current_tick;
        self.queue_op("stop", last, |q| q.stop())?;
        let tick = self
            .queue_op("current_tick", last, |q| q.current_tick())?
            .min(self.total_ticks());
        self.silence(tick)?;
        self.state.status = Status::Paused;
        self.state.current_tick = tick;
        info!("paused at tick {}", tick);
        Ok(())
    }

    /// Continue from where `pause` (or a paused `seek`) left off.
    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        self.require("resume", &[Status::Paused])?;
        self.play(self.state.current_tick)
    }

    /// Move to `target_tick` (clamped), keeping the Playing/Paused status.
    ///
    /// While paused only the position moves; nothing is submitted until
    /// `resume`.
    pub fn seek(&mut self, target_tick: u64) -> Result<(), PlaybackError> {
        self.require("seek", &[Status::Playing, Status::Paused])?;
        let target = target_tick.min(self.total_ticks());

        if self.state.status == Status::Playing {
            let tick = self.current_tick();
            self.queue_op("stop", tick, |q| q.stop())?;
            self.silence(tick)?;
            self.state.status = Status::Paused;
            info!("seeking from tick {} to {}", tick, target);
            return self.play(target);
        }

        self.queue_op("reset_position", target, |q| q.reset_position(target))?;
        self.state.current_tick = target;
        debug!("paused position moved to tick {}", target);
        Ok(())
    }

    /// Stop playback and rewind to tick 0. Valid in any state.
    pub fn stop(&mut self) -> Result<(), PlaybackError> {
        let tick = self.current_tick();
        self.queue_op("stop", tick, |q| q.stop())?;
        self.silence(tick)?;
        self.queue_op("reset_position", 0, |q| q.reset_position(0))?;
        if self.state.status != Status::Stopped {
            info!("stopped at tick {}", tick);
        }
        self.state = PlaybackState::default();
        Ok(())
    }

    // --- Progress ---

    /// Playback position; read from the queue while playing.
    pub fn current_tick(&self) -> u64 {
        let tick = match self.state.status {
            Status::Playing => self.queue.current_tick().unwrap_or_else(|e| {
                debug!("could not read queue tick: {}", e);
                self.state.current_tick
            }),
            Status::Paused | Status::Stopped => self.state.current_tick,
        };
        tick.min(self.total_ticks())
    }

    pub fn current_seconds(&self) -> f64 {
        self.song
            .as_ref()
            .map_or(0.0, |song| song.ticks_to_seconds(self.current_tick()))
    }

    pub fn duration_seconds(&self) -> f64 {
        self.song.as_ref().map_or(0.0, |song| song.duration_seconds)
    }

    pub fn total_ticks(&self) -> u64 {
        self.song.as_ref().map_or(0, |song| song.total_ticks)
    }

    // --- Submission worker ---

    /// Collect the worker's result if it has finished.
    ///
    /// A queue failure in the worker stops the scheduler and is returned
    /// as [`PlaybackError::Queue`].
    pub fn check_worker(&mut self) -> Result<Option<SubmitOutcome>, PlaybackError> {
        let received = match &self.worker {
            None => return Ok(None),
            Some(worker) => match worker.outcome.try_recv() {
                Ok(result) => Some(result),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => None,
            },
        };
        self.finish_worker(received)
    }

    /// Block until the current submission pass ends.
    pub fn wait_for_submission(&mut self) -> Result<Option<SubmitOutcome>, PlaybackError> {
        let received = match &self.worker {
            None => return Ok(None),
            Some(worker) => worker.outcome.recv().ok(),
        };
        self.finish_worker(received)
    }

    // --- Direct messages ---

    /// Send a complete SysEx message now.
    pub fn send_sysex(&mut self, bytes: &[u8]) -> Result<(), PlaybackError> {
        let msg = DirectMessage::SysEx(bytes.to_vec());
        self.send_direct(&msg)
    }

    /// Set the receiver's master volume (0..=127).
    pub fn set_master_volume(&mut self, volume: u8) -> Result<(), PlaybackError> {
        debug!("master volume {}", volume);
        self.send_direct(&master_volume_sysex(volume))
    }

    fn send_direct(&mut self, msg: &DirectMessage) -> Result<(), PlaybackError> {
        let dest = self.config.destination;
        let tick = self.current_tick();
        self.queue_op("send_direct", tick, |q| q.send_direct(dest, msg))
    }

    // --- Internals ---

    fn require(&self, op: &'static str, allowed: &[Status]) -> Result<(), PlaybackError> {
        if allowed.contains(&self.state.status) {
            Ok(())
        } else {
            Err(PlaybackError::InvalidState { op, state: self.state.status })
        }
    }

    /// Run a queue call; on failure shut down and report.
    fn queue_op<T>(
        &mut self,
        op: &'static str,
        tick: u64,
        f: impl FnOnce(&Q) -> Result<T, QueueError>,
    ) -> Result<T, PlaybackError> {
        match f(&self.queue) {
            Ok(value) => Ok(value),
            Err(source) => {
                warn!("queue {} failed at tick {}: {}", op, tick, source);
                self.halt();
                Err(PlaybackError::Queue { op, tick, source })
            }
        }
    }

    fn spawn_worker(&mut self, song: Arc<Song>, from: u64) -> Result<(), PlaybackError> {
        let cancel = CancelToken::new();
        let (tx, rx) = bounded(1);
        let pass = Pass {
            queue: Arc::clone(&self.queue),
            song,
            dest: self.config.destination,
            from,
            chase: self.config.chase_controls,
            cancel: cancel.clone(),
        };

        let spawned = thread::Builder::new()
            .name("smf-submit".into())
            .spawn(move || {
                let _ = tx.send(pass.run());
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(Worker { cancel, handle, outcome: rx });
                Ok(())
            }
            Err(e) => {
                self.halt();
                Err(PlaybackError::Worker(e.to_string()))
            }
        }
    }

    /// Cancel the worker, empty the queue backlog and send the Panic burst.
    fn silence(&mut self, tick: u64) -> Result<(), PlaybackError> {
        if let Some(worker) = self.worker.take() {
            worker.cancel.cancel();
            // unblocks a submit waiting for room
            let dropped = self.queue.drop_pending();
            if let Err(payload) = worker.handle.join() {
                warn!("submission worker panicked: {}", panic_message(payload.as_ref()));
            }
            match worker.outcome.try_recv() {
                Ok(Ok(outcome)) => debug!("submission pass ended: {:?}", outcome),
                Ok(Err(e)) => {
                    warn!("submission pass failed before cancel: {}", e);
                    self.halt();
                    return Err(e);
                }
                Err(_) => {}
            }
            self.queue_op("drop_pending", tick, |_| dropped)?;
        }
        self.queue_op("drop_pending", tick, |q| q.drop_pending())?;

        let dest = self.config.destination;
        let burst = panic_burst();
        for msg in &burst {
            self.queue_op("panic", tick, |q| q.send_direct(dest, msg))?;
        }
        Ok(())
    }

    fn finish_worker(&mut self, received: Option<PassResult>) -> Result<Option<SubmitOutcome>, PlaybackError> {
        let Some(worker) = self.worker.take() else {
            return Ok(None);
        };
        let joined = worker.handle.join();
        match (received, joined) {
            (Some(Ok(outcome)), _) => {
                debug!("submission pass ended: {:?}", outcome);
                Ok(Some(outcome))
            }
            (Some(Err(err)), _) => {
                warn!("submission pass failed: {}", err);
                self.halt();
                Err(err)
            }
            (None, Err(payload)) => {
                self.halt();
                Err(PlaybackError::Worker(panic_message(payload.as_ref())))
            }
            (None, Ok(())) => {
                self.halt();
                Err(PlaybackError::Worker("worker exited without a result".to_string()))
            }
        }
    }

    /// Best-effort shutdown after a failure. Always ends Stopped.
    fn halt(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel.cancel();
            let _ = self.queue.drop_pending();
            let _ = worker.handle.join();
        }
        let dest = self.config.destination;
        let cleanup = self
            .queue
            .stop()
            .and_then(|()| self.queue.drop_pending())
            .and_then(|()| panic_burst().iter().try_for_each(|msg| self.queue.send_direct(dest, msg)));
        if let Err(e) = cleanup {
            debug!("queue cleanup after failure: {}", e);
        }
        self.state = PlaybackState::default();
    }
}

impl<Q: OutputQueue + 'static> Drop for Scheduler<Q> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel.cancel();
            let _ = self.queue.drop_pending();
            let _ = worker.handle.join();
        }
    }
}
