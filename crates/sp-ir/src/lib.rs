//! Core IR types for smfplay.
//!
//! This crate defines the decoded representation shared by the file
//! decoder and the playback scheduler: a flat, tick-ordered event
//! timeline plus the tempo map used to turn ticks into seconds.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod analysis;
mod event;
pub mod song;
mod tempo;

pub use analysis::{analyze, format_clock, PlaybackPosition, SongSummary};
pub use event::{Event, EventKind};
pub use song::{Song, SmfFormat};
pub use tempo::{TempoEntry, TempoMap, DEFAULT_TEMPO};
