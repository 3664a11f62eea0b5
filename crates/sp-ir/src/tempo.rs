//! Tempo map and tick/seconds conversion.
//!
//! Ticks are converted to real time by integrating over constant-tempo
//! segments: each segment contributes
//! `ticks * us_per_quarter / division / 1_000_000` seconds.

use alloc::vec::Vec;

use crate::event::{Event, EventKind};

/// Tempo used until the first tempo change: 500000 us per quarter (120 BPM).
pub const DEFAULT_TEMPO: u32 = 500_000;

/// One constant-tempo segment start.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TempoEntry {
    /// Tick where this tempo takes effect
    pub tick: u64,
    /// Microseconds per quarter note
    pub micros_per_quarter: u32,
    /// Elapsed seconds at `tick` (cached prefix sum)
    pub seconds: f64,
}

/// Ordered tempo changes of a song. Always starts at tick 0.
#[derive(Clone, Debug, PartialEq)]
pub struct TempoMap {
    division: u16,
    entries: Vec<TempoEntry>,
}

impl TempoMap {
    /// Build a tempo map from a tick-sorted event timeline.
    ///
    /// A later tempo change at the same tick replaces the earlier one.
    /// `division` is ticks per quarter note and must be non-zero.
    pub fn from_events(events: &[Event], division: u16) -> Self {
        let mut changes: Vec<(u64, u32)> = Vec::new();
        changes.push((0, DEFAULT_TEMPO));

        for event in events {
            if let EventKind::TempoChange(us) = event.kind {
                match changes.last_mut() {
                    Some(last) if last.0 == event.tick => last.1 = us,
                    _ => changes.push((event.tick, us)),
                }
            }
        }

        Self::from_changes(&changes, division)
    }

    /// Build a tempo map from `(tick, us_per_quarter)` pairs sorted by tick.
    pub fn from_changes(changes: &[(u64, u32)], division: u16) -> Self {
        let division = division.max(1);
        let mut entries: Vec<TempoEntry> = Vec::with_capacity(changes.len() + 1);

        for &(tick, micros_per_quarter) in changes {
            let micros_per_quarter = micros_per_quarter.max(1);
            match entries.last_mut() {
                Some(last) if last.tick == tick => last.micros_per_quarter = micros_per_quarter,
                Some(last) => {
                    let seconds = last.seconds
                        + segment_seconds(tick - last.tick, last.micros_per_quarter, division);
                    entries.push(TempoEntry { tick, micros_per_quarter, seconds });
                }
                None => {
                    if tick > 0 {
                        entries.push(TempoEntry { tick: 0, micros_per_quarter: DEFAULT_TEMPO, seconds: 0.0 });
                        let seconds = segment_seconds(tick, DEFAULT_TEMPO, division);
                        entries.push(TempoEntry { tick, micros_per_quarter, seconds });
                    } else {
                        entries.push(TempoEntry { tick: 0, micros_per_quarter, seconds: 0.0 });
                    }
                }
            }
        }

        if entries.is_empty() {
            entries.push(TempoEntry { tick: 0, micros_per_quarter: DEFAULT_TEMPO, seconds: 0.0 });
        }

        Self { division, entries }
    }

    /// Ticks per quarter note.
    pub fn division(&self) -> u16 {
        self.division
    }

    /// All tempo segments, first one at tick 0.
    pub fn entries(&self) -> &[TempoEntry] {
        &self.entries
    }

    /// Number of tempo segments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: the map has at least the tick-0 entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Microseconds per quarter in effect at `tick`.
    pub fn tempo_at(&self, tick: u64) -> u32 {
        self.segment_for_tick(tick).micros_per_quarter
    }

    /// Beats per minute in effect at `tick`.
    pub fn bpm_at(&self, tick: u64) -> f64 {
        60_000_000.0 / self.tempo_at(tick) as f64
    }

    /// Elapsed seconds from song start to `tick`.
    pub fn ticks_to_seconds(&self, tick: u64) -> f64 {
        let seg = self.segment_for_tick(tick);
        seg.seconds + segment_seconds(tick - seg.tick, seg.micros_per_quarter, self.division)
    }

    /// Tick reached after `seconds` of playback, rounded down.
    pub fn seconds_to_ticks(&self, seconds: f64) -> u64 {
        if seconds.is_nan() || seconds <= 0.0 {
            return 0;
        }
        let idx = self
            .entries
            .partition_point(|e| e.seconds <= seconds)
            .saturating_sub(1);
        let seg = &self.entries[idx];
        let ticks_per_second =
            self.division as f64 * 1_000_000.0 / seg.micros_per_quarter as f64;
        let ticks = libm::floor((seconds - seg.seconds) * ticks_per_second + 1e-9);
        seg.tick + ticks as u64
    }

    fn segment_for_tick(&self, tick: u64) -> &TempoEntry {
        let idx = self.entries.partition_point(|e| e.tick <= tick).saturating_sub(1);
        &self.entries[idx]
    }
}

fn segment_seconds(ticks: u64, micros_per_quarter: u32, division: u16) -> f64 {
    ticks as f64 * micros_per_quarter as f64 / division as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempo(tick: u64, us: u32) -> Event {
        Event::new(tick, EventKind::TempoChange(us))
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn default_tempo_when_no_changes() {
        let map = TempoMap::from_events(&[], 480);
        assert_eq!(map.len(), 1);
        assert_eq!(map.tempo_at(10_000), DEFAULT_TEMPO);
        assert!(approx(map.ticks_to_seconds(480), 0.5));
        assert!(approx(map.bpm_at(0), 120.0));
    }

    #[test]
    fn tempo_at_zero_replaces_default() {
        let map = TempoMap::from_events(&[tempo(0, 1_000_000)], 96);
        assert_eq!(map.len(), 1);
        assert!(approx(map.ticks_to_seconds(96), 1.0));
    }

    #[test]
    fn duplicate_tick_keeps_last() {
        let map = TempoMap::from_events(&[tempo(480, 250_000), tempo(480, 750_000)], 480);
        assert_eq!(map.len(), 2);
        assert_eq!(map.tempo_at(480), 750_000);
        assert_eq!(map.tempo_at(479), DEFAULT_TEMPO);
    }

    #[test]
    fn piecewise_integration() {
        // 0..480 at 120 BPM (0.5s), 480..960 at 60 BPM (1.0s)
        let map = TempoMap::from_events(&[tempo(480, 1_000_000)], 480);
        assert!(approx(map.ticks_to_seconds(480), 0.5));
        assert!(approx(map.ticks_to_seconds(720), 1.0));
        assert!(approx(map.ticks_to_seconds(960), 1.5));
    }

    #[test]
    fn seconds_to_ticks_inverts() {
        let map = TempoMap::from_events(&[tempo(480, 1_000_000), tempo(1200, 300_000)], 480);
        assert_eq!(map.seconds_to_ticks(0.0), 0);
        assert_eq!(map.seconds_to_ticks(-3.0), 0);
        assert_eq!(map.seconds_to_ticks(0.5), 480);
        assert_eq!(map.seconds_to_ticks(1.0), 720);

        let total = map.ticks_to_seconds(4000);
        let tick_resolution = 300_000.0 / 480.0 / 1_000_000.0;
        let mut x = 0.0;
        while x <= total {
            let back = map.ticks_to_seconds(map.seconds_to_ticks(x));
            assert!(back <= x + 1e-9, "{} -> {}", x, back);
            assert!(x - back < 1_000_000.0 / 480.0 / 1_000_000.0 + 1e-9, "{} -> {}", x, back);
            x += tick_resolution * 7.3;
        }
    }

    #[test]
    fn from_changes_inserts_default_before_late_first_change() {
        let map = TempoMap::from_changes(&[(960, 250_000)], 480);
        assert_eq!(map.entries()[0].tick, 0);
        assert_eq!(map.entries()[0].micros_per_quarter, DEFAULT_TEMPO);
        assert!(approx(map.entries()[1].seconds, 1.0));
    }
}
