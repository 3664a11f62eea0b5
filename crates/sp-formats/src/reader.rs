//! Cursor over an in-memory byte buffer.

use crate::FormatError;

/// Reads big-endian fields, chunk tags and variable-length quantities.
///
/// Every failed read reports `TruncatedData` with the absolute offset
/// where the missing bytes should have been; nothing is zero-filled.
#[derive(Clone, Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    /// Absolute offset of `data[0]` in the original input
    base: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Reader whose reported positions start at `base`.
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    /// Absolute offset of the next byte.
    pub fn position(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn eof(&self) -> FormatError {
        FormatError::TruncatedData { offset: self.base + self.data.len() }
    }

    pub fn skip(&mut self, n: usize) -> Result<(), FormatError> {
        if n > self.remaining() {
            return Err(self.eof());
        }
        self.pos += n;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        let v = *self.data.get(self.pos).ok_or_else(|| self.eof())?;
        self.pos += 1;
        Ok(v)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u16_be(&mut self) -> Result<u16, FormatError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a 24-bit big-endian value (tempo meta payload).
    pub fn read_u24_be(&mut self) -> Result<u32, FormatError> {
        let [a, b, c] = self.read_array()?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    /// Read a four-character chunk id.
    pub fn read_tag(&mut self) -> Result<[u8; 4], FormatError> {
        self.read_array()
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        if n > self.remaining() {
            return Err(self.eof());
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a variable-length quantity: 7 bits per byte, high bit set on
    /// every byte but the last, at most 4 bytes.
    pub fn read_vlq(&mut self) -> Result<u32, FormatError> {
        let start = self.position();
        let mut value: u32 = 0;
        for _ in 0..4 {
            let byte = self.read_u8()?;
            value = (value << 7) | (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(FormatError::TruncatedData { offset: start })
    }

    /// Split off the next `len` bytes as their own reader.
    ///
    /// If fewer than `len` bytes remain, the sub-reader covers what is
    /// left and the returned flag is `true`.
    pub fn split_chunk(&mut self, len: usize) -> (ByteReader<'a>, bool) {
        let take = len.min(self.remaining());
        let chunk = ByteReader::with_base(&self.data[self.pos..self.pos + take], self.position());
        self.pos += take;
        (chunk, take < len)
    }
}
