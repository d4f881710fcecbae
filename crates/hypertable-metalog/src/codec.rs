//! A scratch-growable byte buffer and a matching decode cursor.
//!
//! Every metalog entry variant (see [`crate::entry`]) serializes itself through this module:
//! fixed-width little-endian integers and length-prefixed byte strings, with no other framing.

use thiserror::Error;


/// Appends self-describing primitive values to a growable buffer. Mirrors the wire format
/// described by [`Cursor`], which decodes whatever an `EncodeBuf` produces.
#[derive(Debug, Clone, Default)]
pub struct EncodeBuf(Vec<u8>);

impl EncodeBuf {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.0.push(value);
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.0.extend_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.0.extend_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.0.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a `u16` length prefix followed by the raw bytes of `s`.
    ///
    /// # Panics
    /// Panics if `s.len()` exceeds [`u16::MAX`]; row keys and range bounds are not expected to
    /// approach that length.
    pub fn write_str(&mut self, s: &[u8]) {
        let len = u16::try_from(s.len()).expect("string exceeds u16::MAX bytes");
        self.write_u16(len);
        self.0.extend_from_slice(s);
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

/// A read cursor over a borrowed byte slice, tracking `(pointer, remaining)` as decoding
/// proceeds. On a short read, the cursor's position is left unspecified; callers must treat a
/// [`ShortBuffer`] error as fatal to the surrounding decode, not something to retry past.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos:   usize,
}

impl<'a> Cursor<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ShortBuffer> {
        if n > self.remaining() {
            return Err(ShortBuffer { needed: n, remaining: self.remaining() });
        }
        #[expect(clippy::indexing_slicing, reason = "just checked n <= remaining")]
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ShortBuffer> {
        self.take(1).map(|s| s[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ShortBuffer> {
        self.take(2).map(|s| u16::from_le_bytes(s.try_into().expect("len checked")))
    }

    pub fn read_u32(&mut self) -> Result<u32, ShortBuffer> {
        self.take(4).map(|s| u32::from_le_bytes(s.try_into().expect("len checked")))
    }

    pub fn read_u64(&mut self) -> Result<u64, ShortBuffer> {
        self.take(8).map(|s| u64::from_le_bytes(s.try_into().expect("len checked")))
    }

    /// Reads a `u16` length prefix followed by that many raw bytes, returning a view into the
    /// underlying buffer. The buffer must outlive the returned slice.
    pub fn read_str(&mut self) -> Result<&'a [u8], ShortBuffer> {
        let len = self.read_u16()?;
        self.take(usize::from(len))
    }
}

/// The requested width exceeded the bytes remaining in the cursor.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("short buffer: needed {needed} bytes but only {remaining} remained")]
pub struct ShortBuffer {
    pub needed:    usize,
    pub remaining: usize,
}
