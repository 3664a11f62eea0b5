//! Song structure.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::event::Event;
use crate::tempo::TempoMap;

/// SMF header format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SmfFormat {
    /// Format 0: one multi-channel track
    #[default]
    SingleTrack,
    /// Format 1: simultaneous tracks sharing one timeline
    Simultaneous,
    /// Format 2: independent sequences (played like format 1)
    Sequential,
}

impl SmfFormat {
    /// Map the header's format word.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::SingleTrack),
            1 => Some(Self::Simultaneous),
            2 => Some(Self::Sequential),
            _ => None,
        }
    }

    /// The header's format word.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::SingleTrack => 0,
            Self::Simultaneous => 1,
            Self::Sequential => 2,
        }
    }
}

/// A decoded song: one merged timeline plus its timing information.
///
/// Built once per file open and never modified afterwards; the player
/// shares it behind an `Arc`.
#[derive(Clone, Debug)]
pub struct Song {
    /// First sequence/track name found in the file
    pub title: ArrayString<32>,
    /// Header format
    pub format: SmfFormat,
    /// Number of track chunks decoded
    pub track_count: u16,
    /// Ticks per quarter note
    pub division: u16,
    /// All events, sorted by (tick, track, position in track)
    pub events: Vec<Event>,
    /// Tick of the last event
    pub total_ticks: u64,
    /// Tempo changes, starting at tick 0
    pub tempo_map: TempoMap,
    /// Elapsed time at `total_ticks`
    pub duration_seconds: f64,
}

impl Song {
    /// Assemble a song from an already merged, tick-sorted timeline.
    ///
    /// Derives `total_ticks`, the tempo map and the duration.
    pub fn new(title: &str, format: SmfFormat, track_count: u16, division: u16, events: Vec<Event>) -> Self {
        let total_ticks = events.iter().map(|e| e.tick).max().unwrap_or(0);
        let tempo_map = TempoMap::from_events(&events, division);
        let duration_seconds = tempo_map.ticks_to_seconds(total_ticks);

        let mut name = ArrayString::new();
        for ch in title.chars() {
            if name.try_push(ch).is_err() {
                break;
            }
        }

        Self {
            title: name,
            format,
            track_count,
            division,
            events,
            total_ticks,
            tempo_map,
            duration_seconds,
        }
    }

    /// Elapsed seconds at `tick`.
    pub fn ticks_to_seconds(&self, tick: u64) -> f64 {
        self.tempo_map.ticks_to_seconds(tick)
    }

    /// Tick reached after `seconds`, clamped to the song length.
    pub fn seconds_to_ticks(&self, seconds: f64) -> u64 {
        self.tempo_map.seconds_to_ticks(seconds).min(self.total_ticks)
    }

    /// Index of the first event at or after `tick`.
    pub fn first_event_at(&self, tick: u64) -> usize {
        self.events.partition_point(|e| e.tick < tick)
    }

    /// Events with `tick >= from`, in timeline order.
    pub fn events_from(&self, from: u64) -> &[Event] {
        &self.events[self.first_event_at(from)..]
    }

    /// True when the timeline holds nothing but end-of-track markers.
    pub fn is_silent(&self) -> bool {
        self.events.iter().all(Event::is_end_of_track)
    }
}
