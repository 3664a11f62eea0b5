//! Song summary and playback position reporting.

use alloc::collections::BTreeSet;
use alloc::format;
use alloc::string::String;
use core::fmt;

use crate::event::EventKind;
use crate::song::Song;

/// Summary of what a song contains.
pub struct SongSummary {
    pub total_notes: usize,
    pub note_range: Option<(u8, u8)>,
    pub channels_used: BTreeSet<u8>,
    pub programs_used: BTreeSet<u8>,
    pub tempo_changes: usize,
    pub sysex_messages: usize,
    pub min_bpm: f64,
    pub max_bpm: f64,
}

/// Scan a song and report what it uses.
pub fn analyze(song: &Song) -> SongSummary {
    let mut summary = SongSummary {
        total_notes: 0,
        note_range: None,
        channels_used: BTreeSet::new(),
        programs_used: BTreeSet::new(),
        tempo_changes: 0,
        sysex_messages: 0,
        min_bpm: f64::MAX,
        max_bpm: 0.0,
    };

    for event in &song.events {
        if let Some(ch) = event.channel() {
            summary.channels_used.insert(ch);
        }
        match event.kind {
            EventKind::NoteOn { note, velocity, .. } if velocity > 0 => {
                summary.total_notes += 1;
                summary.note_range = Some(match summary.note_range {
                    Some((lo, hi)) => (lo.min(note), hi.max(note)),
                    None => (note, note),
                });
            }
            EventKind::ProgramChange { program, .. } => {
                summary.programs_used.insert(program);
            }
            EventKind::TempoChange(_) => summary.tempo_changes += 1,
            EventKind::SysEx(_) => summary.sysex_messages += 1,
            _ => {}
        }
    }

    for entry in song.tempo_map.entries() {
        let bpm = 60_000_000.0 / entry.micros_per_quarter as f64;
        summary.min_bpm = summary.min_bpm.min(bpm);
        summary.max_bpm = summary.max_bpm.max(bpm);
    }

    summary
}

impl fmt::Display for SongSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Notes:    {} total", self.total_notes)?;
        if let Some((lo, hi)) = self.note_range {
            writeln!(f, "Range:    {} - {} (MIDI)", lo, hi)?;
        }
        write!(f, "Channels:")?;
        for ch in &self.channels_used {
            write!(f, " {}", ch + 1)?;
        }
        writeln!(f)?;
        if !self.programs_used.is_empty() {
            writeln!(f, "Programs: {}", self.programs_used.len())?;
        }
        if libm::fabs(self.max_bpm - self.min_bpm) < 0.005 {
            writeln!(f, "Tempo:    {:.2} BPM", self.max_bpm)?;
        } else {
            writeln!(
                f,
                "Tempo:    {:.2} - {:.2} BPM ({} changes)",
                self.min_bpm, self.max_bpm, self.tempo_changes
            )?;
        }
        if self.sysex_messages > 0 {
            writeln!(f, "SysEx:    {} messages", self.sysex_messages)?;
        }
        Ok(())
    }
}

/// Where playback is within a song.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackPosition {
    pub tick: u64,
    pub seconds: f64,
    pub total_ticks: u64,
    pub total_seconds: f64,
}

impl PlaybackPosition {
    /// Position of `tick` within `song`.
    pub fn of(song: &Song, tick: u64) -> Self {
        let tick = tick.min(song.total_ticks);
        Self {
            tick,
            seconds: song.ticks_to_seconds(tick),
            total_ticks: song.total_ticks,
            total_seconds: song.duration_seconds,
        }
    }

    /// Fraction of the song played, 0.0..=1.0.
    pub fn fraction(&self) -> f64 {
        if self.total_ticks == 0 {
            return 0.0;
        }
        self.tick as f64 / self.total_ticks as f64
    }
}

impl fmt::Display for PlaybackPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", format_clock(self.seconds), format_clock(self.total_seconds))
    }
}

/// Format seconds as `mm:ss` (minutes keep growing past 99).
pub fn format_clock(seconds: f64) -> String {
    let whole = if seconds.is_finite() && seconds > 0.0 { seconds as u64 } else { 0 };
    format!("{:02}:{:02}", whole / 60, whole % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::song::SmfFormat;
    use alloc::vec;

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0.0), "00:00");
        assert_eq!(format_clock(59.9), "00:59");
        assert_eq!(format_clock(61.0), "01:01");
        assert_eq!(format_clock(6000.0), "100:00");
        assert_eq!(format_clock(-2.0), "00:00");
    }

    #[test]
    fn summary_counts_notes_and_channels() {
        let events = vec![
            Event::new(0, EventKind::ProgramChange { channel: 9, program: 0 }),
            Event::new(0, EventKind::NoteOn { channel: 0, note: 60, velocity: 64 }),
            Event::new(0, EventKind::NoteOn { channel: 9, note: 36, velocity: 100 }),
            Event::new(240, EventKind::NoteOn { channel: 0, note: 60, velocity: 0 }),
            Event::new(480, EventKind::TempoChange(250_000)),
            Event::new(960, EventKind::EndOfTrack),
        ];
        let song = Song::new("", SmfFormat::SingleTrack, 1, 480, events);
        let summary = analyze(&song);

        assert_eq!(summary.total_notes, 2);
        assert_eq!(summary.note_range, Some((36, 60)));
        assert_eq!(summary.channels_used.len(), 2);
        assert_eq!(summary.tempo_changes, 1);
        assert!((summary.min_bpm - 120.0).abs() < 1e-9);
        assert!((summary.max_bpm - 240.0).abs() < 1e-9);
    }

    #[test]
    fn position_display_and_fraction() {
        let events = vec![Event::new(960 * 30, EventKind::EndOfTrack)];
        let song = Song::new("", SmfFormat::SingleTrack, 1, 480, events);
        let pos = PlaybackPosition::of(&song, 960 * 15);
        assert_eq!(pos.to_string(), "00:15 / 00:30");
        assert!((pos.fraction() - 0.5).abs() < 1e-9);

        let past_end = PlaybackPosition::of(&song, u64::MAX);
        assert_eq!(past_end.tick, song.total_ticks);
    }
}
