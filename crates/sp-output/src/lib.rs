//! Output queue backends for smfplay.
//!
//! [`VirtualQueue`] is a software sequencer queue: it runs its own tempo
//! clock and hands each message to a [`MessageSink`] when its tick comes
//! up.

mod sink;
mod virtual_queue;

pub use sink::{CollectSink, Delivered, LogSink, MessageSink};
pub use virtual_queue::{VirtualQueue, DEFAULT_CAPACITY};
