//! Format parsers for smfplay.
//!
//! Decodes Standard MIDI Files, bare or wrapped in a RIFF `RMID`
//! container, into the IR [`Song`].

mod merge;
pub mod reader;
pub mod riff;
pub mod smf;

pub use merge::merge_tracks;
pub use riff::{unwrap_container, Payload};
pub use smf::{decode_smf, Header};

use sp_ir::Song;
use thiserror::Error;

/// Error type for format parsing.
///
/// Offsets are absolute byte positions in the buffer handed to
/// [`load_midi`], including when the SMF data sits inside a RIFF file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Input ended in the middle of a value or chunk
    #[error("unexpected end of data at byte {offset}")]
    TruncatedData { offset: usize },
    /// A track chunk contains bytes that are not valid SMF events
    #[error("corrupt track {track} at byte {offset}: {reason}")]
    CorruptTrack {
        track: usize,
        offset: usize,
        reason: &'static str,
    },
    /// Not an SMF or RMID file, or an unsupported header
    #[error("unrecognized format at byte {offset}: {reason}")]
    UnrecognizedFormat { offset: usize, reason: &'static str },
    /// Division uses SMPTE frames instead of ticks per quarter note
    #[error("SMPTE timing (division {division:#06x}) is not supported")]
    UnsupportedTiming { division: u16 },
    /// The file decodes to nothing playable
    #[error("song contains no events")]
    EmptySong,
}

/// Load a MIDI file (`.mid` or `.rmi`) from bytes.
pub fn load_midi(data: &[u8]) -> Result<Song, FormatError> {
    let payload = unwrap_container(data)?;
    decode_smf(payload.data, payload.offset)
}
