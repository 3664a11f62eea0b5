//! Output queue trait and the types that cross it.

use core::fmt;
use core::str::FromStr;

use sp_ir::Event;
use thiserror::Error;

/// Error reported by an output queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The sequencer or device went away
    #[error("output queue disconnected")]
    Disconnected,
    /// The queue refused the request
    #[error("output queue rejected request: {0}")]
    Rejected(String),
    /// The queue was shut down
    #[error("output queue closed")]
    Closed,
}

/// Address of the receiving port, as `client:port`.
///
/// The scheduler never interprets it; it is handed to the queue with
/// every event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Destination {
    pub client: u8,
    pub port: u8,
}

impl Destination {
    pub const fn new(client: u8, port: u8) -> Self {
        Self { client, port }
    }
}

impl Default for Destination {
    /// First user client, where software synths usually register.
    fn default() -> Self {
        Self::new(128, 0)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client, self.port)
    }
}

/// Error parsing a [`Destination`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid destination {0:?}, expected client:port")]
pub struct ParseDestinationError(pub String);

impl FromStr for Destination {
    type Err = ParseDestinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDestinationError(s.to_string());
        let (client, port) = s.trim().split_once(':').ok_or_else(err)?;
        Ok(Self {
            client: client.trim().parse().map_err(|_| err())?,
            port: port.trim().parse().map_err(|_| err())?,
        })
    }
}

/// A message sent immediately, outside the tick timeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectMessage {
    /// Control change
    Controller { channel: u8, param: u8, value: u8 },
    /// Complete system exclusive message, `F0 .. F7`
    SysEx(Vec<u8>),
}

impl DirectMessage {
    /// Wire bytes of the message.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Controller { channel, param, value } => {
                vec![0xB0 | (channel & 0x0F), param & 0x7F, value & 0x7F]
            }
            Self::SysEx(bytes) => bytes.clone(),
        }
    }
}

/// A clock-synchronized event queue (an ALSA sequencer queue or similar).
///
/// Events are submitted ahead of time tagged with their absolute tick;
/// the queue delivers each one when its own clock reaches that tick. The
/// queue's tick is the single source of truth for the playback position.
///
/// All methods take `&self`: the scheduler, its submission worker and
/// the end-of-song poller share one queue behind an `Arc`.
pub trait OutputQueue: Send + Sync {
    /// Start the clock from the current position.
    fn start(&self) -> Result<(), QueueError>;

    /// Freeze the clock. Pending events stay queued.
    fn stop(&self) -> Result<(), QueueError>;

    /// Restart a stopped clock at `tick`.
    fn continue_from(&self, tick: u64) -> Result<(), QueueError>;

    /// Move the clock to `tick` without starting it.
    fn reset_position(&self, tick: u64) -> Result<(), QueueError>;

    /// Tick the clock has reached.
    fn current_tick(&self) -> Result<u64, QueueError>;

    /// Set the tick resolution, in ticks per quarter note.
    fn set_resolution(&self, ticks_per_quarter: u16) -> Result<(), QueueError>;

    /// Set the clock rate immediately, in microseconds per quarter note.
    fn set_tempo(&self, micros_per_quarter: u32) -> Result<(), QueueError>;

    /// Queue an event for delivery at `event.tick`.
    ///
    /// May block while the queue's backlog is full. Tempo changes are
    /// applied to the clock when reached.
    fn submit(&self, dest: Destination, event: &Event) -> Result<(), QueueError>;

    /// Queue a directive that stops the clock at `tick`.
    fn schedule_stop(&self, tick: u64) -> Result<(), QueueError>;

    /// Deliver a message now, bypassing the timeline.
    fn send_direct(&self, dest: Destination, msg: &DirectMessage) -> Result<(), QueueError>;

    /// Discard every queued event not yet delivered and wake any
    /// submitter blocked on a full backlog.
    fn drop_pending(&self) -> Result<(), QueueError>;

    /// Block until everything submitted so far has been accepted.
    fn drain(&self) -> Result<(), QueueError>;

    /// Block until everything submitted so far has been delivered.
    fn sync(&self) -> Result<(), QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_destination() {
        assert_eq!("128:0".parse::<Destination>().unwrap(), Destination::new(128, 0));
        assert_eq!(" 20 : 1 ".parse::<Destination>().unwrap(), Destination::new(20, 1));
        assert!("128".parse::<Destination>().is_err());
        assert!("a:b".parse::<Destination>().is_err());
        assert!("300:0".parse::<Destination>().is_err());
        assert_eq!(Destination::new(14, 0).to_string(), "14:0");
    }

    #[test]
    fn controller_wire_bytes() {
        let msg = DirectMessage::Controller { channel: 9, param: 0x7B, value: 0 };
        assert_eq!(msg.to_bytes(), vec![0xB9, 0x7B, 0x00]);
    }
}
