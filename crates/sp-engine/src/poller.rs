//! End-of-song detection.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};

use crate::traits::OutputQueue;

/// Sent once when the queue clock reaches the end of the song.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SongFinished {
    pub tick: u64,
}

/// Background thread that watches the queue clock.
///
/// Every `interval` it reads the queue tick; once that reaches
/// `total_ticks` it sends one [`SongFinished`] and exits. Dropping the
/// poller stops the thread.
pub struct EndPoller {
    shutdown: Option<Sender<()>>,
    finished: Receiver<SongFinished>,
    handle: Option<JoinHandle<()>>,
}

impl EndPoller {
    pub fn spawn<Q>(queue: Arc<Q>, total_ticks: u64, interval: Duration) -> Self
    where
        Q: OutputQueue + ?Sized + 'static,
    {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let (finished_tx, finished_rx) = bounded(1);

        let handle = thread::Builder::new()
            .name("smf-poller".into())
            .spawn(move || loop {
                match queue.current_tick() {
                    Ok(tick) if tick >= total_ticks => {
                        debug!("queue reached tick {} of {}", tick, total_ticks);
                        let _ = finished_tx.send(SongFinished { tick });
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => debug!("poller could not read queue tick: {}", e),
                }
                match shutdown_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => return,
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("could not start end-of-song poller: {}", e);
                None
            }
        };

        Self {
            shutdown: Some(shutdown_tx),
            finished: finished_rx,
            handle,
        }
    }

    /// Channel that receives the end signal.
    pub fn receiver(&self) -> &Receiver<SongFinished> {
        &self.finished
    }

    /// Non-blocking check for the end signal.
    pub fn try_finished(&self) -> Option<SongFinished> {
        self.finished.try_recv().ok()
    }

    /// Wait up to `timeout` for the end signal.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<SongFinished> {
        self.finished.recv_timeout(timeout).ok()
    }
}

impl Drop for EndPoller {
    fn drop(&mut self) {
        // disconnecting the shutdown channel wakes the thread
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingQueue;

    #[test]
    fn signals_once_at_end() {
        let queue = Arc::new(RecordingQueue::new());
        let poller = EndPoller::spawn(queue.clone(), 960, Duration::from_millis(1));
        assert_eq!(poller.try_finished(), None);

        queue.set_tick(960);
        assert_eq!(poller.wait_timeout(Duration::from_secs(5)), Some(SongFinished { tick: 960 }));
        assert_eq!(poller.wait_timeout(Duration::from_millis(20)), None);
    }

    #[test]
    fn drop_stops_thread() {
        let queue = Arc::new(RecordingQueue::new());
        let poller = EndPoller::spawn(queue, 960, Duration::from_secs(60));
        drop(poller);
    }
}
