//! In-memory queue that records every call, for tests.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use sp_ir::Event;

use crate::traits::{Destination, DirectMessage, OutputQueue, QueueError};

/// One recorded [`OutputQueue`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueCall {
    Start,
    Stop,
    ContinueFrom(u64),
    ResetPosition(u64),
    SetResolution(u16),
    SetTempo(u32),
    Submit(Destination, Event),
    ScheduleStop(u64),
    Direct(Destination, DirectMessage),
    DropPending,
    Drain,
    Sync,
}

#[derive(Default)]
struct Inner {
    calls: Vec<QueueCall>,
    tick: u64,
    running: bool,
    /// Submits beyond this many block until released or dropped
    hold_after: Option<usize>,
    submitted: usize,
    /// Bumped by `drop_pending`; a blocked submit that sees it change
    /// discards its event
    generation: u64,
    waiting: bool,
    fail: Option<(&'static str, QueueError)>,
}

impl Inner {
    fn take_failure(&mut self, op: &'static str) -> Result<(), QueueError> {
        if self.fail.as_ref().is_some_and(|(name, _)| *name == op) {
            if let Some((_, err)) = self.fail.take() {
                return Err(err);
            }
        }
        Ok(())
    }
}

/// Queue double: the clock only moves when a test calls [`set_tick`].
///
/// [`set_tick`]: RecordingQueue::set_tick
#[derive(Default)]
pub struct RecordingQueue {
    inner: Mutex<Inner>,
    wake: Condvar,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<QueueCall> {
        self.inner.lock().calls.clone()
    }

    /// Every call so far, clearing the log.
    pub fn take_calls(&self) -> Vec<QueueCall> {
        core::mem::take(&mut self.inner.lock().calls)
    }

    /// Events accepted by `submit`, in order.
    pub fn submitted(&self) -> Vec<Event> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                QueueCall::Submit(_, event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    /// Messages sent with `send_direct`, in order.
    pub fn direct_messages(&self) -> Vec<DirectMessage> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                QueueCall::Direct(_, msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    /// Move the clock, as if playback had advanced.
    pub fn set_tick(&self, tick: u64) {
        self.inner.lock().tick = tick;
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// Block submits once `n` events have been accepted.
    pub fn hold_after(&self, n: usize) {
        self.inner.lock().hold_after = Some(n);
    }

    /// Let held submits through.
    pub fn release(&self) {
        self.inner.lock().hold_after = None;
        self.wake.notify_all();
    }

    /// Make the next call named `op` fail with `err`.
    pub fn fail_next(&self, op: &'static str, err: QueueError) {
        self.inner.lock().fail = Some((op, err));
    }

    /// Wait until a submit is blocked by [`hold_after`](Self::hold_after).
    pub fn wait_until_blocked(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !inner.waiting {
            if self.wake.wait_until(&mut inner, deadline).timed_out() {
                return inner.waiting;
            }
        }
        true
    }

    fn record(&self, op: &'static str, call: QueueCall) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        inner.take_failure(op)?;
        inner.calls.push(call);
        Ok(())
    }
}

impl OutputQueue for RecordingQueue {
    fn start(&self) -> Result<(), QueueError> {
        self.record("start", QueueCall::Start)?;
        self.inner.lock().running = true;
        Ok(())
    }

    fn stop(&self) -> Result<(), QueueError> {
        self.record("stop", QueueCall::Stop)?;
        self.inner.lock().running = false;
        Ok(())
    }

    fn continue_from(&self, tick: u64) -> Result<(), QueueError> {
        self.record("continue", QueueCall::ContinueFrom(tick))?;
        let mut inner = self.inner.lock();
        inner.tick = tick;
        inner.running = true;
        Ok(())
    }

    fn reset_position(&self, tick: u64) -> Result<(), QueueError> {
        self.record("reset_position", QueueCall::ResetPosition(tick))?;
        self.inner.lock().tick = tick;
        Ok(())
    }

    fn current_tick(&self) -> Result<u64, QueueError> {
        let mut inner = self.inner.lock();
        inner.take_failure("current_tick")?;
        Ok(inner.tick)
    }

    fn set_resolution(&self, ticks_per_quarter: u16) -> Result<(), QueueError> {
        self.record("set_resolution", QueueCall::SetResolution(ticks_per_quarter))
    }

    fn set_tempo(&self, micros_per_quarter: u32) -> Result<(), QueueError> {
        self.record("set_tempo", QueueCall::SetTempo(micros_per_quarter))
    }

    fn submit(&self, dest: Destination, event: &Event) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        inner.take_failure("submit")?;
        let generation = inner.generation;
        while inner.hold_after.is_some_and(|n| inner.submitted >= n) && inner.generation == generation {
            inner.waiting = true;
            self.wake.notify_all();
            self.wake.wait(&mut inner);
        }
        inner.waiting = false;
        if inner.generation != generation {
            return Ok(());
        }
        inner.submitted += 1;
        inner.calls.push(QueueCall::Submit(dest, event.clone()));
        Ok(())
    }

    fn schedule_stop(&self, tick: u64) -> Result<(), QueueError> {
        self.record("schedule_stop", QueueCall::ScheduleStop(tick))
    }

    fn send_direct(&self, dest: Destination, msg: &DirectMessage) -> Result<(), QueueError> {
        self.record("send_direct", QueueCall::Direct(dest, msg.clone()))
    }

    fn drop_pending(&self) -> Result<(), QueueError> {
        self.record("drop_pending", QueueCall::DropPending)?;
        self.inner.lock().generation += 1;
        self.wake.notify_all();
        Ok(())
    }

    fn drain(&self) -> Result<(), QueueError> {
        self.record("drain", QueueCall::Drain)
    }

    fn sync(&self) -> Result<(), QueueError> {
        self.record("sync", QueueCall::Sync)
    }
}
