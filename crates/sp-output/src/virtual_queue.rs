//! In-process sequencer queue with its own tempo clock.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;
use sp_engine::{Destination, DirectMessage, OutputQueue, QueueError};
use sp_ir::{Event, EventKind, DEFAULT_TEMPO};

use crate::sink::MessageSink;

/// Default backlog size in events.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Longest the delivery thread sleeps before re-checking the clock.
const MAX_SLEEP: Duration = Duration::from_millis(50);

/// Something waiting in the backlog for its tick.
#[derive(Debug)]
enum Scheduled {
    Message { tick: u64, dest: Destination, bytes: Vec<u8> },
    Tempo { tick: u64, micros_per_quarter: u32 },
    Stop { tick: u64 },
}

impl Scheduled {
    fn tick(&self) -> u64 {
        match *self {
            Scheduled::Message { tick, .. } | Scheduled::Tempo { tick, .. } | Scheduled::Stop { tick } => tick,
        }
    }
}

/// Tick clock: `origin_tick` at `origin`, advancing at `division`
/// ticks per `tempo` microseconds while running.
#[derive(Debug)]
struct Clock {
    running: bool,
    origin: Instant,
    origin_tick: u64,
    division: u16,
    tempo: u32,
}

impl Clock {
    fn tick_at(&self, now: Instant) -> u64 {
        if !self.running {
            return self.origin_tick;
        }
        let micros = now.saturating_duration_since(self.origin).as_micros();
        let ticks = micros * self.division as u128 / self.tempo as u128;
        self.origin_tick.saturating_add(ticks.min(u64::MAX as u128) as u64)
    }

    /// How long from `now` until `tick` is reached. `None` while stopped.
    fn time_until(&self, tick: u64, now: Instant) -> Option<Duration> {
        if !self.running {
            return None;
        }
        let ahead = tick.saturating_sub(self.tick_at(now)) as u128;
        let micros = ahead * self.tempo as u128 / self.division as u128;
        Some(Duration::from_micros(micros.min(u64::MAX as u128) as u64))
    }

    /// Move the origin to `now` without changing the current tick.
    fn rebase(&mut self, now: Instant) {
        self.origin_tick = self.tick_at(now);
        self.origin = now;
    }

    fn set_position(&mut self, tick: u64, now: Instant) {
        self.origin_tick = tick;
        self.origin = now;
    }
}

struct State {
    clock: Clock,
    /// Pushed by submitters and popped by the delivery thread, both
    /// under the state lock
    backlog: HeapRb<Scheduled>,
    /// Popped from the backlog, waiting for its tick
    next: Option<Scheduled>,
    /// Bumped by `drop_pending`; a blocked submitter that sees it
    /// change discards its event
    generation: u64,
    closed: bool,
}

impl State {
    fn has_pending(&self) -> bool {
        self.next.is_some() || !self.backlog.is_empty()
    }

    fn clear(&mut self) -> usize {
        let mut dropped = usize::from(self.next.take().is_some());
        while self.backlog.try_pop().is_some() {
            dropped += 1;
        }
        dropped
    }
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
    sink: Mutex<Box<dyn MessageSink>>,
}

/// An [`OutputQueue`] that keeps time itself and hands due messages to
/// a [`MessageSink`] from a delivery thread.
///
/// Submissions go into a bounded backlog; `submit` blocks while it is
/// full. Events must be submitted in tick order.
pub struct VirtualQueue {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl VirtualQueue {
    pub fn new(capacity: usize, sink: impl MessageSink) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                clock: Clock {
                    running: false,
                    origin: Instant::now(),
                    origin_tick: 0,
                    division: 96,
                    tempo: DEFAULT_TEMPO,
                },
                backlog: HeapRb::new(capacity.max(1)),
                next: None,
                generation: 0,
                closed: false,
            }),
            wake: Condvar::new(),
            sink: Mutex::new(Box::new(sink)),
        });

        let worker = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("smf-delivery".into())
            .spawn(move || delivery_loop(&worker));
        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("could not start delivery thread: {}", e);
                shared.state.lock().closed = true;
                None
            }
        };

        Self { shared, thread }
    }

    /// Number of events waiting for delivery.
    pub fn pending(&self) -> usize {
        let state = self.shared.state.lock();
        state.backlog.occupied_len() + usize::from(state.next.is_some())
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().clock.running
    }

    /// Push into the backlog, waiting for room.
    fn enqueue(&self, item: Scheduled) -> Result<(), QueueError> {
        let mut state = self.shared.state.lock();
        let generation = state.generation;
        let mut item = item;
        loop {
            if state.closed {
                return Err(QueueError::Closed);
            }
            if state.generation != generation {
                debug!("dropped event at tick {} while waiting for room", item.tick());
                return Ok(());
            }
            match state.backlog.try_push(item) {
                Ok(()) => break,
                Err(rejected) => {
                    item = rejected;
                    self.shared.wake.wait(&mut state);
                }
            }
        }
        self.shared.wake.notify_all();
        Ok(())
    }

    fn with_clock(&self, f: impl FnOnce(&mut Clock, Instant)) -> Result<(), QueueError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        f(&mut state.clock, Instant::now());
        self.shared.wake.notify_all();
        Ok(())
    }
}

impl Drop for VirtualQueue {
    fn drop(&mut self) {
        self.shared.state.lock().closed = true;
        self.shared.wake.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl OutputQueue for VirtualQueue {
    fn start(&self) -> Result<(), QueueError> {
        self.with_clock(|clock, now| {
            clock.origin = now;
            clock.running = true;
        })
    }

    fn stop(&self) -> Result<(), QueueError> {
        self.with_clock(|clock, now| {
            clock.rebase(now);
            clock.running = false;
        })
    }

    fn continue_from(&self, tick: u64) -> Result<(), QueueError> {
        self.with_clock(|clock, now| {
            clock.set_position(tick, now);
            clock.running = true;
        })
    }

    fn reset_position(&self, tick: u64) -> Result<(), QueueError> {
        self.with_clock(|clock, now| clock.set_position(tick, now))
    }

    fn current_tick(&self) -> Result<u64, QueueError> {
        let state = self.shared.state.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        Ok(state.clock.tick_at(Instant::now()))
    }

    fn set_resolution(&self, ticks_per_quarter: u16) -> Result<(), QueueError> {
        self.with_clock(|clock, now| {
            clock.rebase(now);
            clock.division = ticks_per_quarter.max(1);
        })
    }

    fn set_tempo(&self, micros_per_quarter: u32) -> Result<(), QueueError> {
        self.with_clock(|clock, now| {
            clock.rebase(now);
            clock.tempo = micros_per_quarter.max(1);
        })
    }

    fn submit(&self, dest: Destination, event: &Event) -> Result<(), QueueError> {
        let tick = event.tick;
        let item = match &event.kind {
            EventKind::TempoChange(us) => Scheduled::Tempo { tick, micros_per_quarter: *us },
            EventKind::SysEx(bytes) => Scheduled::Message { tick, dest, bytes: bytes.clone() },
            EventKind::EndOfTrack => return Ok(()),
            _ => match event.midi_bytes() {
                Some(bytes) => Scheduled::Message { tick, dest, bytes: bytes.to_vec() },
                None => return Ok(()),
            },
        };
        self.enqueue(item)
    }

    fn schedule_stop(&self, tick: u64) -> Result<(), QueueError> {
        self.enqueue(Scheduled::Stop { tick })
    }

    fn send_direct(&self, dest: Destination, msg: &DirectMessage) -> Result<(), QueueError> {
        let tick = self.current_tick()?;
        self.shared.sink.lock().deliver(tick, dest, &msg.to_bytes());
        Ok(())
    }

    fn drop_pending(&self) -> Result<(), QueueError> {
        let mut state = self.shared.state.lock();
        let dropped = state.clear();
        state.generation += 1;
        self.shared.wake.notify_all();
        if dropped > 0 {
            debug!("dropped {} pending events", dropped);
        }
        Ok(())
    }

    fn drain(&self) -> Result<(), QueueError> {
        if self.shared.state.lock().closed {
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    fn sync(&self) -> Result<(), QueueError> {
        let mut state = self.shared.state.lock();
        let generation = state.generation;
        while state.has_pending() && state.generation == generation {
            if state.closed {
                return Err(QueueError::Closed);
            }
            self.shared.wake.wait(&mut state);
        }
        Ok(())
    }
}

fn delivery_loop(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if state.closed {
            return;
        }
        if state.next.is_none() {
            state.next = state.backlog.try_pop();
            if state.next.is_some() {
                // room freed for a blocked submitter
                shared.wake.notify_all();
            }
        }
        let Some(due) = state.next.as_ref().map(Scheduled::tick) else {
            shared.wake.wait(&mut state);
            continue;
        };

        let now = Instant::now();
        match state.clock.time_until(due, now) {
            Some(wait) if wait.is_zero() => {}
            Some(wait) => {
                shared.wake.wait_for(&mut state, wait.min(MAX_SLEEP));
                continue;
            }
            None => {
                shared.wake.wait(&mut state);
                continue;
            }
        }

        match state.next.take() {
            Some(Scheduled::Message { tick, dest, bytes }) => {
                shared.sink.lock().deliver(tick, dest, &bytes);
            }
            Some(Scheduled::Tempo { tick, micros_per_quarter }) => {
                state.clock.set_position(tick, now);
                state.clock.tempo = micros_per_quarter.max(1);
                debug!("tempo {} us/quarter at tick {}", micros_per_quarter, tick);
            }
            Some(Scheduled::Stop { tick }) => {
                state.clock.set_position(tick, now);
                state.clock.running = false;
                debug!("clock stopped at tick {}", tick);
            }
            None => {}
        }
        shared.wake.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CollectSink;
    use pretty_assertions::assert_eq;

    fn note(tick: u64, note: u8) -> Event {
        Event::new(tick, EventKind::NoteOn { channel: 0, note, velocity: 100 })
    }

    fn fast_queue(capacity: usize) -> (VirtualQueue, CollectSink) {
        let sink = CollectSink::new();
        let queue = VirtualQueue::new(capacity, sink.clone());
        queue.set_resolution(100).unwrap();
        // 100 ticks per 10 ms
        queue.set_tempo(10_000).unwrap();
        (queue, sink)
    }

    #[test]
    fn delivers_in_order_then_stops_clock() {
        let (queue, sink) = fast_queue(16);
        let dest = Destination::new(20, 0);
        queue.submit(dest, &note(0, 60)).unwrap();
        queue.submit(dest, &Event::new(50, EventKind::TempoChange(20_000))).unwrap();
        queue.submit(dest, &note(100, 62)).unwrap();
        queue.submit(dest, &Event::new(100, EventKind::EndOfTrack)).unwrap();
        queue.schedule_stop(150).unwrap();
        queue.start().unwrap();
        queue.sync().unwrap();

        let delivered = sink.delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].bytes, vec![0x90, 60, 100]);
        assert_eq!(delivered[1].tick, 100);
        assert_eq!(delivered[1].dest, dest);
        assert_eq!(queue.current_tick().unwrap(), 150);
        assert!(!queue.is_running());
    }

    #[test]
    fn stopped_clock_holds_events() {
        let (queue, sink) = fast_queue(16);
        queue.submit(Destination::default(), &note(10, 60)).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(sink.is_empty());
        assert_eq!(queue.current_tick().unwrap(), 0);
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn positions_move_the_clock() {
        let (queue, _sink) = fast_queue(16);
        queue.reset_position(500).unwrap();
        assert_eq!(queue.current_tick().unwrap(), 500);
        queue.continue_from(100).unwrap();
        assert!(queue.current_tick().unwrap() >= 100);
        queue.stop().unwrap();
        let frozen = queue.current_tick().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.current_tick().unwrap(), frozen);
    }

    #[test]
    fn drop_pending_unblocks_submitter() {
        let (queue, _sink) = fast_queue(2);
        let queue = Arc::new(queue);
        let submitter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..5 {
                    queue.submit(Destination::default(), &note(10 + i, 60)).unwrap();
                }
            })
        };
        // the clock never starts, so the backlog fills up
        while queue.pending() < 2 {
            thread::sleep(Duration::from_millis(1));
        }
        queue.drop_pending().unwrap();
        submitter.join().unwrap();
        // backlog plus the event held by the delivery thread
        assert!(queue.pending() <= 3);
    }

    #[test]
    fn direct_messages_skip_the_backlog() {
        let (queue, sink) = fast_queue(16);
        let msg = DirectMessage::Controller { channel: 3, param: 0x78, value: 0 };
        queue.send_direct(Destination::default(), &msg).unwrap();
        assert_eq!(sink.delivered()[0].bytes, vec![0xB3, 0x78, 0x00]);
    }
}
