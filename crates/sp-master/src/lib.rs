//! Headless controller for smfplay.
//!
//! Provides one API for loading a file, transport control and progress
//! that the CLI (or any other front end) can drive.

mod config;

use std::sync::Arc;
use std::time::Instant;

use log::info;
use sp_engine::{EndPoller, Scheduler};
use thiserror::Error;

// Re-export common types so callers don't need the lower crates directly.
pub use config::PlayerConfig;
pub use sp_engine::{Destination, OutputQueue, PlaybackError, SchedulerConfig, Status};
pub use sp_formats::FormatError;
pub use sp_ir::{analyze, format_clock, PlaybackPosition, Song, SongSummary};
pub use sp_output::{CollectSink, LogSink, MessageSink, VirtualQueue};

/// Error type for controller operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// Headless player: owns the scheduler and the end-of-song poller.
pub struct Controller<Q: OutputQueue + 'static> {
    scheduler: Scheduler<Q>,
    config: PlayerConfig,
    poller: Option<EndPoller>,
    /// When the poller reported the end of the song
    finished_at: Option<Instant>,
}

impl Controller<VirtualQueue> {
    /// Controller driving a software queue that delivers into `sink`.
    pub fn with_sink(config: PlayerConfig, sink: impl MessageSink) -> Self {
        let queue = Arc::new(VirtualQueue::new(config.queue_capacity, sink));
        Self::new(queue, config)
    }
}

impl<Q: OutputQueue + 'static> Controller<Q> {
    pub fn new(queue: Arc<Q>, config: PlayerConfig) -> Self {
        Self {
            scheduler: Scheduler::new(queue, config.scheduler),
            config,
            poller: None,
            finished_at: None,
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler<Q> {
        &self.scheduler
    }

    // --- Song management ---

    pub fn song(&self) -> Option<&Song> {
        self.scheduler.song().map(|song| song.as_ref())
    }

    /// Decode a `.mid` or `.rmi` file and load it, replacing any current song.
    pub fn load_midi(&mut self, data: &[u8]) -> Result<(), ControllerError> {
        self.close()?;
        let song = sp_formats::load_midi(data)?;
        self.scheduler.open(Arc::new(song))?;
        Ok(())
    }

    pub fn summary(&self) -> Option<SongSummary> {
        self.song().map(analyze)
    }

    /// Stop and unload the current song.
    pub fn close(&mut self) -> Result<(), ControllerError> {
        self.poller = None;
        self.finished_at = None;
        self.scheduler.close()?;
        Ok(())
    }

    // --- Transport ---

    /// Start from the beginning, or resume if paused.
    pub fn play(&mut self) -> Result<(), ControllerError> {
        match self.scheduler.state() {
            Status::Paused => self.resume(),
            _ => self.play_from_seconds(0.0),
        }
    }

    /// Start playback at `seconds` into the song.
    pub fn play_from_seconds(&mut self, seconds: f64) -> Result<(), ControllerError> {
        let tick = self.song().map_or(0, |song| song.seconds_to_ticks(seconds));
        self.scheduler.play(tick)?;
        self.restart_poller();
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), ControllerError> {
        self.poller = None;
        self.scheduler.pause()?;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), ControllerError> {
        self.scheduler.resume()?;
        self.restart_poller();
        Ok(())
    }

    /// Pause when playing, resume when paused.
    pub fn toggle_pause(&mut self) -> Result<(), ControllerError> {
        match self.scheduler.state() {
            Status::Playing => self.pause(),
            _ => self.resume(),
        }
    }

    /// Jump to `seconds` into the song, keeping the play/pause status.
    pub fn seek_seconds(&mut self, seconds: f64) -> Result<(), ControllerError> {
        let tick = self.song().map_or(0, |song| song.seconds_to_ticks(seconds));
        self.seek_tick(tick)
    }

    pub fn seek_tick(&mut self, tick: u64) -> Result<(), ControllerError> {
        self.scheduler.seek(tick)?;
        if self.scheduler.state() == Status::Playing {
            self.restart_poller();
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), ControllerError> {
        self.poller = None;
        self.finished_at = None;
        self.scheduler.stop()?;
        Ok(())
    }

    pub fn set_master_volume(&mut self, volume: u8) -> Result<(), ControllerError> {
        self.scheduler.set_master_volume(volume)?;
        Ok(())
    }

    // --- Progress ---

    pub fn state(&self) -> Status {
        self.scheduler.state()
    }

    pub fn position(&self) -> Option<PlaybackPosition> {
        let song = self.song()?;
        Some(PlaybackPosition::of(song, self.scheduler.current_tick()))
    }

    /// Check on playback. Returns `true` once the song has ended and the
    /// end delay has passed, after stopping the player.
    ///
    /// Surfaces submission failures from the worker.
    pub fn poll_finished(&mut self) -> Result<bool, ControllerError> {
        self.scheduler.check_worker()?;

        if self.finished_at.is_none() {
            if let Some(done) = self.poller.as_ref().and_then(EndPoller::try_finished) {
                info!("song finished at tick {}", done.tick);
                self.finished_at = Some(Instant::now());
            }
        }

        match self.finished_at {
            Some(at) if at.elapsed() >= self.config.end_delay => {
                self.stop()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Block until the current submission pass has handed every event
    /// to the queue.
    pub fn wait_for_submission(&mut self) -> Result<(), ControllerError> {
        self.scheduler.wait_for_submission()?;
        Ok(())
    }

    fn restart_poller(&mut self) {
        self.finished_at = None;
        let total = self.scheduler.total_ticks();
        // drop the old poller before starting a new one
        self.poller = None;
        self.poller = Some(EndPoller::spawn(
            Arc::clone(self.scheduler.queue()),
            total,
            self.config.poll_interval,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sp_engine::mock::RecordingQueue;
    use std::time::Duration;

    /// NoteOn at 0 and NoteOff at 480, division 480.
    fn one_note_smf() -> Vec<u8> {
        let body: &[u8] = &[
            0x00, 0x90, 60, 100,
            0x83, 0x60, 0x80, 60, 0,
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let mut out = Vec::new();
        out.extend(b"MThd");
        out.extend(&6u32.to_be_bytes());
        out.extend(&[0, 0, 0, 1, 0x01, 0xE0]);
        out.extend(b"MTrk");
        out.extend(&(body.len() as u32).to_be_bytes());
        out.extend(body);
        out
    }

    fn controller(end_delay: Duration) -> (Controller<RecordingQueue>, Arc<RecordingQueue>) {
        let queue = Arc::new(RecordingQueue::new());
        let config = PlayerConfig {
            poll_interval: Duration::from_millis(1),
            end_delay,
            ..PlayerConfig::default()
        };
        let mut c = Controller::new(queue.clone(), config);
        c.load_midi(&one_note_smf()).unwrap();
        (c, queue)
    }

    #[test]
    fn load_reports_duration() {
        let (c, _queue) = controller(Duration::ZERO);
        let song = c.song().unwrap();
        assert_eq!(song.total_ticks, 480);
        assert!((song.duration_seconds - 0.5).abs() < 1e-9);
        assert_eq!(c.summary().unwrap().total_notes, 1);
        assert_eq!(c.position().unwrap().to_string(), "00:00 / 00:00");
    }

    #[test]
    fn bad_file_is_format_error() {
        let queue = Arc::new(RecordingQueue::new());
        let mut c = Controller::new(queue, PlayerConfig::default());
        assert!(matches!(
            c.load_midi(b"definitely not midi"),
            Err(ControllerError::Format(FormatError::UnrecognizedFormat { .. }))
        ));
        assert!(c.song().is_none());
        assert!(matches!(c.play(), Err(ControllerError::Playback(PlaybackError::NoSong))));
    }

    #[test]
    fn seek_in_seconds_uses_tempo_map() {
        let (mut c, queue) = controller(Duration::ZERO);
        c.play().unwrap();
        c.pause().unwrap();
        c.seek_seconds(0.25).unwrap();
        assert_eq!(c.position().unwrap().tick, 240);
        queue.take_calls();

        c.toggle_pause().unwrap();
        assert_eq!(c.state(), Status::Playing);
        c.wait_for_submission().unwrap();
        c.stop().unwrap();
        // only the note-off at 480 lies at or after tick 240
        assert_eq!(queue.submitted().len(), 1);
    }

    #[test]
    fn finishes_when_queue_reaches_end() {
        let (mut c, queue) = controller(Duration::ZERO);
        c.play().unwrap();
        assert!(!c.poll_finished().unwrap());

        queue.set_tick(480);
        let mut finished = false;
        for _ in 0..1000 {
            if c.poll_finished().unwrap() {
                finished = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(finished);
        assert_eq!(c.state(), Status::Stopped);
    }

    #[test]
    fn loading_replaces_playing_song() {
        let (mut c, _queue) = controller(Duration::ZERO);
        c.play().unwrap();
        c.load_midi(&one_note_smf()).unwrap();
        assert_eq!(c.state(), Status::Stopped);
    }
}
