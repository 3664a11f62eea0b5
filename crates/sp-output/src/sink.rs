//! Where delivered messages end up.

use std::sync::Arc;

use log::info;
use parking_lot::Mutex;
use sp_engine::Destination;

/// Receives each message when the queue clock reaches it.
pub trait MessageSink: Send + 'static {
    /// `bytes` is a complete MIDI message: a channel voice message or a
    /// SysEx message.
    fn deliver(&mut self, tick: u64, dest: Destination, bytes: &[u8]);
}

/// Logs every message at `info` level.
#[derive(Debug, Default)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn deliver(&mut self, tick: u64, dest: Destination, bytes: &[u8]) {
        info!("{:>8} -> {}: {:02X?}", tick, dest, bytes);
    }
}

/// A delivered message, as kept by [`CollectSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivered {
    pub tick: u64,
    pub dest: Destination,
    pub bytes: Vec<u8>,
}

/// Keeps every delivered message in memory. Clones share one log.
#[derive(Clone, Debug, Default)]
pub struct CollectSink {
    log: Arc<Mutex<Vec<Delivered>>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.log.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageSink for CollectSink {
    fn deliver(&mut self, tick: u64, dest: Destination, bytes: &[u8]) {
        self.log.lock().push(Delivered { tick, dest, bytes: bytes.to_vec() });
    }
}
