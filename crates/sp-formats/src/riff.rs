//! RIFF (`RMID`) container detection.
//!
//! An `.rmi` file is a RIFF form whose `data` chunk holds an ordinary
//! SMF. Anything not starting with `RIFF` is passed through unchanged.

use log::debug;

use crate::reader::ByteReader;
use crate::FormatError;

/// SMF bytes located inside the input, with their absolute offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Payload<'a> {
    pub data: &'a [u8],
    pub offset: usize,
}

/// Locate the SMF payload, unwrapping a RIFF container if present.
pub fn unwrap_container(data: &[u8]) -> Result<Payload<'_>, FormatError> {
    if !data.starts_with(b"RIFF") {
        return Ok(Payload { data, offset: 0 });
    }

    let mut r = ByteReader::new(data);
    r.skip(4)?;
    let riff_len = r.read_u32_le()? as usize;
    let form = r.read_tag()?;
    debug!("RIFF form {:?}", String::from_utf8_lossy(&form));

    while !r.is_empty() {
        let tag = r.read_tag()?;
        let len = r.read_u32_le()? as usize;
        let (chunk, truncated) = r.split_chunk(len);

        if &tag == b"data" {
            let offset = chunk.position();
            let remaining = chunk.remaining();
            return Ok(Payload { data: &data[offset..offset + remaining], offset });
        }

        debug!("skipping RIFF chunk {:?} ({} bytes)", String::from_utf8_lossy(&tag), len);
        if truncated {
            return Err(FormatError::TruncatedData { offset: r.position() });
        }
        if len % 2 == 1 && !r.is_empty() {
            r.skip(1)?;
        }
    }

    // ran out before the declared end of the form
    if riff_len.saturating_add(8) > data.len() {
        return Err(FormatError::TruncatedData { offset: data.len() });
    }
    Err(FormatError::UnrecognizedFormat {
        offset: r.position(),
        reason: "RIFF file has no data chunk",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn riff(chunks: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(b"RMID");
        for (tag, payload) in chunks {
            body.extend(*tag);
            body.extend(&(payload.len() as u32).to_le_bytes());
            body.extend(*payload);
            if payload.len() % 2 == 1 {
                body.push(0);
            }
        }
        let mut out = Vec::new();
        out.extend(b"RIFF");
        out.extend(&(body.len() as u32).to_le_bytes());
        out.extend(body);
        out
    }

    #[test]
    fn raw_input_passes_through() {
        let data = b"MThd\0\0\0\x06";
        let payload = unwrap_container(data).unwrap();
        assert_eq!(payload.data, data);
        assert_eq!(payload.offset, 0);
    }

    #[test]
    fn finds_data_chunk_after_odd_sized_chunk() {
        let file = riff(&[(b"INFO", b"abc"), (b"data", b"MThd")]);
        let payload = unwrap_container(&file).unwrap();
        assert_eq!(payload.data, b"MThd");
        // 12 header + 8 + 3 + 1 pad + 8
        assert_eq!(payload.offset, 32);
    }

    #[test]
    fn missing_data_chunk_is_unrecognized() {
        let file = riff(&[(b"INFO", b"ab")]);
        assert!(matches!(
            unwrap_container(&file),
            Err(FormatError::UnrecognizedFormat { .. })
        ));
    }

    #[test]
    fn cut_chunk_header_is_truncated() {
        let mut file = riff(&[(b"INFO", b"ab"), (b"data", b"MThd")]);
        file.truncate(24);
        assert!(matches!(
            unwrap_container(&file),
            Err(FormatError::TruncatedData { .. })
        ));
    }

    #[test]
    fn cut_at_chunk_boundary_is_truncated() {
        let mut file = riff(&[(b"INFO", b"ab"), (b"data", b"MThd")]);
        // header only, then after the INFO chunk
        for len in [22, 12] {
            file.truncate(len);
            assert_eq!(
                unwrap_container(&file),
                Err(FormatError::TruncatedData { offset: len })
            );
        }
    }

    #[test]
    fn short_data_chunk_is_clamped() {
        let mut file = riff(&[(b"data", b"MThd\0\0")]);
        file.truncate(file.len() - 2);
        let payload = unwrap_container(&file).unwrap();
        assert_eq!(payload.data, b"MThd");
    }
}
