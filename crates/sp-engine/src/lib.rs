//! Playback scheduler for smfplay.
//!
//! Feeds a decoded [`Song`](sp_ir::Song) to a clock-synchronized
//! [`OutputQueue`] with play, pause, resume, seek and stop, and watches
//! for the end of the song.

mod chase;
mod messages;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
mod poller;
pub mod scheduler;
mod traits;

pub use chase::chase_events;
pub use messages::{master_volume_sysex, panic_burst, PanicBurst, CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF, PANIC_LEN};
pub use poller::{EndPoller, SongFinished};
pub use scheduler::{
    CancelToken, PlaybackError, PlaybackState, Scheduler, SchedulerConfig, Status, SubmitOutcome,
};
pub use traits::{Destination, DirectMessage, OutputQueue, ParseDestinationError, QueueError};
