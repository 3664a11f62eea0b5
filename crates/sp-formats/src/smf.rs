//! Standard MIDI File decoder.
//!
//! Reads the `MThd` header and every `MTrk` chunk into per-track event
//! lists with track-absolute ticks, then hands them to the merger.

use log::{debug, warn};
use sp_ir::{Event, EventKind, SmfFormat, Song};

use crate::merge::merge_tracks;
use crate::reader::ByteReader;
use crate::FormatError;

/// Decoded `MThd` fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub format: SmfFormat,
    pub track_count: u16,
    /// Ticks per quarter note
    pub division: u16,
}

/// One decoded track before merging.
struct TrackData {
    events: Vec<Event>,
    name: Option<String>,
}

const META_TRACK_NAME: u8 = 0x03;
const META_END_OF_TRACK: u8 = 0x2F;
const META_SET_TEMPO: u8 = 0x51;

/// Decode SMF bytes into a song. `offset` is where `data` starts in the
/// original input and is only used for error positions.
pub fn decode_smf(data: &[u8], offset: usize) -> Result<Song, FormatError> {
    let mut r = ByteReader::with_base(data, offset);
    let header = read_header(&mut r)?;
    debug!(
        "SMF format {} with {} tracks, division {}",
        header.format.as_u16(),
        header.track_count,
        header.division
    );

    let mut tracks: Vec<TrackData> = Vec::with_capacity(header.track_count as usize);
    while tracks.len() < header.track_count as usize {
        let tag = r.read_tag()?;
        let len = r.read_u32_be()? as usize;
        let (chunk, truncated) = r.split_chunk(len);

        if &tag != b"MTrk" {
            debug!("skipping chunk {:?} ({} bytes)", String::from_utf8_lossy(&tag), len);
            if truncated {
                return Err(FormatError::TruncatedData { offset: r.position() });
            }
            continue;
        }

        let track = read_track(chunk, tracks.len(), truncated)?;
        debug!("track {}: {} events", tracks.len(), track.events.len());
        tracks.push(track);
    }

    let title = tracks.iter().find_map(|t| t.name.clone()).unwrap_or_default();
    let events = merge_tracks(tracks.into_iter().map(|t| t.events));
    if events.iter().all(Event::is_end_of_track) {
        return Err(FormatError::EmptySong);
    }

    Ok(Song::new(&title, header.format, header.track_count, header.division, events))
}

/// Read and validate the `MThd` chunk.
pub fn read_header(r: &mut ByteReader<'_>) -> Result<Header, FormatError> {
    let start = r.position();
    if &r.read_tag()? != b"MThd" {
        return Err(FormatError::UnrecognizedFormat { offset: start, reason: "missing MThd header" });
    }
    let len_offset = r.position();
    if r.read_u32_be()? != 6 {
        return Err(FormatError::UnrecognizedFormat {
            offset: len_offset,
            reason: "header length is not 6",
        });
    }

    let format_offset = r.position();
    let format = SmfFormat::from_u16(r.read_u16_be()?).ok_or(FormatError::UnrecognizedFormat {
        offset: format_offset,
        reason: "unknown SMF format",
    })?;
    let track_count = r.read_u16_be()?;
    let division_offset = r.position();
    let division = r.read_u16_be()?;

    if division & 0x8000 != 0 {
        return Err(FormatError::UnsupportedTiming { division });
    }
    if division == 0 {
        return Err(FormatError::UnrecognizedFormat {
            offset: division_offset,
            reason: "division is zero",
        });
    }

    Ok(Header { format, track_count, division })
}

/// Number of data bytes following a channel voice status.
fn data_len(status: u8) -> usize {
    match status & 0xF0 {
        0xC0 | 0xD0 => 1,
        _ => 2,
    }
}

/// Decode one `MTrk` chunk.
///
/// `truncated` means the chunk was cut short by the end of the input, in
/// which case running out of bytes is reported as `TruncatedData`
/// instead of `CorruptTrack`.
fn read_track(mut r: ByteReader<'_>, index: usize, truncated: bool) -> Result<TrackData, FormatError> {
    let fail = |err: FormatError| match err {
        FormatError::TruncatedData { offset } if !truncated => FormatError::CorruptTrack {
            track: index,
            offset,
            reason: "event runs past end of track chunk",
        },
        other => other,
    };
    let corrupt = |offset: usize, reason: &'static str| FormatError::CorruptTrack { track: index, offset, reason };

    let mut events = Vec::new();
    let mut name = None;
    let mut tick: u64 = 0;
    let mut running_status: Option<u8> = None;

    loop {
        if r.is_empty() {
            if truncated {
                return Err(FormatError::TruncatedData { offset: r.position() });
            }
            warn!("track {} has no end-of-track marker", index);
            events.push(Event::new(tick, EventKind::EndOfTrack));
            break;
        }

        tick += r.read_vlq().map_err(fail)? as u64;

        let status_offset = r.position();
        let first = r.read_u8().map_err(fail)?;
        let (status, data1) = if first < 0x80 {
            match running_status {
                Some(status) => (status, Some(first)),
                None => return Err(corrupt(status_offset, "data byte without running status")),
            }
        } else {
            (first, None)
        };

        match status {
            0x80..=0xEF => {
                running_status = Some(status);
                let data1 = match data1 {
                    Some(b) => b,
                    None => r.read_u8().map_err(fail)?,
                };
                let data2 = if data_len(status) == 2 { r.read_u8().map_err(fail)? } else { 0 };
                if data1 >= 0x80 || data2 >= 0x80 {
                    return Err(corrupt(status_offset, "status byte where data was expected"));
                }
                if let Some(kind) = EventKind::from_channel_message(status, data1, data2) {
                    events.push(Event::new(tick, kind));
                }
            }
            0xF0 | 0xF7 => {
                running_status = None;
                let len = r.read_vlq().map_err(fail)? as usize;
                let bytes = r.read_bytes(len).map_err(fail)?;
                let mut payload = Vec::with_capacity(len + 1);
                if status == 0xF0 {
                    payload.push(0xF0);
                }
                payload.extend_from_slice(bytes);
                events.push(Event::new(tick, EventKind::SysEx(payload)));
            }
            0xFF => {
                let meta_type = r.read_u8().map_err(fail)?;
                let len = r.read_vlq().map_err(fail)? as usize;
                let data_offset = r.position();
                let data = r.read_bytes(len).map_err(fail)?;
                match meta_type {
                    META_SET_TEMPO if len == 3 => {
                        let us = ByteReader::with_base(data, data_offset).read_u24_be().map_err(fail)?;
                        events.push(Event::new(tick, EventKind::TempoChange(us)));
                    }
                    META_SET_TEMPO => {
                        warn!("track {}: tempo meta with length {} ignored", index, len);
                    }
                    META_END_OF_TRACK => {
                        events.push(Event::new(tick, EventKind::EndOfTrack));
                        if !r.is_empty() {
                            debug!("track {}: {} bytes after end-of-track", index, r.remaining());
                        }
                        break;
                    }
                    META_TRACK_NAME if name.is_none() => {
                        name = Some(String::from_utf8_lossy(data).trim().into());
                    }
                    _ => {}
                }
            }
            _ => return Err(corrupt(status_offset, "invalid status byte")),
        }
    }

    Ok(TrackData { events, name })
}
