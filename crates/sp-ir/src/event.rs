//! Event types for the decoded song timeline.

use alloc::vec::Vec;
use arrayvec::ArrayVec;

/// A scheduled event in the song.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// Absolute tick from song start
    pub tick: u64,
    /// What the event does
    pub kind: EventKind,
}

impl Event {
    /// Create a new event.
    pub fn new(tick: u64, kind: EventKind) -> Self {
        Self { tick, kind }
    }

    /// Channel this event addresses, if it is a channel voice message.
    pub fn channel(&self) -> Option<u8> {
        self.kind.channel()
    }

    /// True for the end-of-track marker, which is never sent anywhere.
    pub fn is_end_of_track(&self) -> bool {
        matches!(self.kind, EventKind::EndOfTrack)
    }

    /// Wire bytes of a channel voice message (status + 1 or 2 data bytes).
    ///
    /// Returns `None` for SysEx, tempo and end-of-track events, which
    /// have no short-message form.
    pub fn midi_bytes(&self) -> Option<ArrayVec<u8, 3>> {
        self.kind.midi_bytes()
    }
}

/// What an event does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    // === Channel voice ===
    /// Note on (velocity 0 is kept as-is; receivers treat it as a release)
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Note off
    NoteOff { channel: u8, note: u8, velocity: u8 },
    /// Polyphonic key pressure
    KeyPressure { channel: u8, note: u8, pressure: u8 },
    /// Control change
    Controller { channel: u8, param: u8, value: u8 },
    /// Program change
    ProgramChange { channel: u8, program: u8 },
    /// Channel pressure
    ChannelPressure { channel: u8, pressure: u8 },
    /// Pitch bend as a signed offset from centre (-8192..=8191)
    PitchBend { channel: u8, value: i16 },

    // === System ===
    /// System exclusive message.
    ///
    /// For `F0` events the payload is the full message including the
    /// leading `F0`; `F7` escape events keep their raw bytes.
    SysEx(Vec<u8>),

    // === Meta ===
    /// Tempo change in microseconds per quarter note
    TempoChange(u32),
    /// End of a track
    EndOfTrack,
}

impl EventKind {
    /// Channel of a channel voice message.
    pub fn channel(&self) -> Option<u8> {
        match *self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::KeyPressure { channel, .. }
            | Self::Controller { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::ChannelPressure { channel, .. }
            | Self::PitchBend { channel, .. } => Some(channel),
            Self::SysEx(_) | Self::TempoChange(_) | Self::EndOfTrack => None,
        }
    }

    /// Short name used in logs and summaries.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoteOn { .. } => "NoteOn",
            Self::NoteOff { .. } => "NoteOff",
            Self::KeyPressure { .. } => "KeyPressure",
            Self::Controller { .. } => "Controller",
            Self::ProgramChange { .. } => "ProgramChange",
            Self::ChannelPressure { .. } => "ChannelPressure",
            Self::PitchBend { .. } => "PitchBend",
            Self::SysEx(_) => "SysEx",
            Self::TempoChange(_) => "TempoChange",
            Self::EndOfTrack => "EndOfTrack",
        }
    }

    /// Build a channel voice event from a status byte and its data bytes.
    ///
    /// `status` must be in `0x80..=0xEF`; `data2` is ignored for the
    /// one-byte messages. Returns `None` for any other status.
    pub fn from_channel_message(status: u8, data1: u8, data2: u8) -> Option<Self> {
        let channel = status & 0x0F;
        let kind = match status & 0xF0 {
            0x80 => Self::NoteOff { channel, note: data1, velocity: data2 },
            0x90 => Self::NoteOn { channel, note: data1, velocity: data2 },
            0xA0 => Self::KeyPressure { channel, note: data1, pressure: data2 },
            0xB0 => Self::Controller { channel, param: data1, value: data2 },
            0xC0 => Self::ProgramChange { channel, program: data1 },
            0xD0 => Self::ChannelPressure { channel, pressure: data1 },
            0xE0 => Self::PitchBend {
                channel,
                value: ((data1 as i16 & 0x7F) | ((data2 as i16 & 0x7F) << 7)) - 0x2000,
            },
            _ => return None,
        };
        Some(kind)
    }

    fn midi_bytes(&self) -> Option<ArrayVec<u8, 3>> {
        let mut out = ArrayVec::new();
        match *self {
            Self::NoteOff { channel, note, velocity } => {
                out.extend([0x80 | channel, note, velocity]);
            }
            Self::NoteOn { channel, note, velocity } => {
                out.extend([0x90 | channel, note, velocity]);
            }
            Self::KeyPressure { channel, note, pressure } => {
                out.extend([0xA0 | channel, note, pressure]);
            }
            Self::Controller { channel, param, value } => {
                out.extend([0xB0 | channel, param, value]);
            }
            Self::ProgramChange { channel, program } => {
                out.extend([0xC0 | channel, program]);
            }
            Self::ChannelPressure { channel, pressure } => {
                out.extend([0xD0 | channel, pressure]);
            }
            Self::PitchBend { channel, value } => {
                let raw = (value + 0x2000) as u16;
                out.extend([0xE0 | channel, (raw & 0x7F) as u8, ((raw >> 7) & 0x7F) as u8]);
            }
            Self::SysEx(_) | Self::TempoChange(_) | Self::EndOfTrack => return None,
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_message_decoding() {
        assert_eq!(
            EventKind::from_channel_message(0x93, 60, 100),
            Some(EventKind::NoteOn { channel: 3, note: 60, velocity: 100 })
        );
        assert_eq!(
            EventKind::from_channel_message(0xC5, 12, 0),
            Some(EventKind::ProgramChange { channel: 5, program: 12 })
        );
        assert_eq!(EventKind::from_channel_message(0xF0, 0, 0), None);
    }

    #[test]
    fn pitch_bend_is_centred() {
        let centre = EventKind::from_channel_message(0xE0, 0x00, 0x40).unwrap();
        assert_eq!(centre, EventKind::PitchBend { channel: 0, value: 0 });

        let low = EventKind::from_channel_message(0xE0, 0x00, 0x00).unwrap();
        assert_eq!(low, EventKind::PitchBend { channel: 0, value: -8192 });

        let high = EventKind::from_channel_message(0xE0, 0x7F, 0x7F).unwrap();
        assert_eq!(high, EventKind::PitchBend { channel: 0, value: 8191 });
    }

    #[test]
    fn midi_bytes_match_wire_form() {
        let ev = Event::new(0, EventKind::Controller { channel: 2, param: 7, value: 90 });
        assert_eq!(ev.midi_bytes().unwrap().as_slice(), &[0xB2, 7, 90]);

        let ev = Event::new(0, EventKind::PitchBend { channel: 1, value: 0 });
        assert_eq!(ev.midi_bytes().unwrap().as_slice(), &[0xE1, 0x00, 0x40]);

        let ev = Event::new(0, EventKind::ChannelPressure { channel: 0, pressure: 5 });
        assert_eq!(ev.midi_bytes().unwrap().len(), 2);

        assert!(Event::new(0, EventKind::TempoChange(500_000)).midi_bytes().is_none());
    }

    #[test]
    fn meta_events_have_no_channel() {
        assert_eq!(EventKind::EndOfTrack.channel(), None);
        assert_eq!(EventKind::SysEx(alloc::vec![0xF0, 0xF7]).channel(), None);
        assert_eq!(EventKind::NoteOff { channel: 9, note: 1, velocity: 0 }.channel(), Some(9));
    }
}
