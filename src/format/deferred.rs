//! Deferred offset writing.
//!
//! Headers that point at data written later reserve a zeroed u32 slot and
//! get a [`Placeholder`] back. Once the data lands, the placeholder is
//! resolved in place. Every relocatable array, track sequence and cross
//! record reference in the crate goes through this one buffer type.

use std::io::{self, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::util::{to_u32, Encodable, Error, Result};

/// Write-ahead token for a u32 slot in a [`DeferredBuffer`].
///
/// Not `Clone`: a slot is resolved exactly once.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a reserved slot must be resolved"]
pub struct Placeholder {
    pos: usize,
}

impl Placeholder {
    /// Byte position of the slot within the buffer.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }
}

/// Growable byte buffer with deferred u32 slots.
///
/// Positions reported by [`DeferredBuffer::position`] are relative to the
/// buffer start, which is the offset base of the container being written.
#[derive(Debug, Default)]
pub struct DeferredBuffer {
    bytes: Vec<u8>,
    pending: usize,
}

impl DeferredBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            pending: 0,
        }
    }

    /// Current length, as a 32-bit offset.
    #[inline]
    pub fn position(&self) -> Result<u32> {
        to_u32(self.bytes.len())
    }

    /// Current length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if nothing was written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of reserved slots not yet resolved.
    #[inline]
    pub fn unresolved(&self) -> usize {
        self.pending
    }

    /// Written bytes so far, including zeroed unresolved slots.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Reserve a u32 slot and return its token.
    pub fn reserve_u32(&mut self) -> Placeholder {
        let pos = self.bytes.len();
        self.bytes.extend_from_slice(&[0; 4]);
        self.pending += 1;
        Placeholder { pos }
    }

    /// Patch a reserved slot with `value`.
    pub fn resolve(&mut self, slot: Placeholder, value: u32) {
        LittleEndian::write_u32(&mut self.bytes[slot.pos..slot.pos + 4], value);
        self.pending -= 1;
    }

    /// Patch a reserved slot with the current position.
    pub fn resolve_here(&mut self, slot: Placeholder) -> Result<()> {
        let here = self.position()?;
        self.resolve(slot, here);
        Ok(())
    }

    /// Overwrite a u32 at an absolute position already written.
    pub fn patch_u32(&mut self, pos: usize, value: u32) -> Result<()> {
        let end = pos + 4;
        if end > self.bytes.len() {
            return Err(Error::invalid(format!("patch at {} past end {}", pos, self.bytes.len())));
        }
        LittleEndian::write_u32(&mut self.bytes[pos..end], value);
        Ok(())
    }

    /// Zero-pad to a multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) {
        if alignment > 1 {
            let rem = self.bytes.len() % alignment;
            if rem != 0 {
                self.bytes.resize(self.bytes.len() + alignment - rem, 0);
            }
        }
    }

    /// Append zero bytes.
    pub fn put_zeros(&mut self, count: usize) {
        self.bytes.resize(self.bytes.len() + count, 0);
    }

    /// Append raw bytes.
    #[inline]
    pub fn put_bytes(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Append a u8 value.
    #[inline]
    pub fn put_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    /// Append an i8 value.
    #[inline]
    pub fn put_i8(&mut self, value: i8) {
        self.bytes.push(value as u8);
    }

    /// Append a u16 value (little-endian).
    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        self.bytes.write_u16::<LittleEndian>(value)?;
        Ok(())
    }

    /// Append an i16 value (little-endian).
    pub fn put_i16(&mut self, value: i16) -> Result<()> {
        self.bytes.write_i16::<LittleEndian>(value)?;
        Ok(())
    }

    /// Append a u32 value (little-endian).
    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        self.bytes.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    /// Append an i32 value (little-endian).
    pub fn put_i32(&mut self, value: i32) -> Result<()> {
        self.bytes.write_i32::<LittleEndian>(value)?;
        Ok(())
    }

    /// Append an f32 value (little-endian).
    pub fn put_f32(&mut self, value: f32) -> Result<()> {
        self.bytes.write_f32::<LittleEndian>(value)?;
        Ok(())
    }

    /// Append one encodable element.
    pub fn put<T: Encodable>(&mut self, value: &T) -> Result<()> {
        value.encode(&mut self.bytes)?;
        Ok(())
    }

    /// Consume the buffer, failing if any slot was never resolved.
    pub fn finish(self) -> Result<Vec<u8>> {
        if self.pending != 0 {
            return Err(Error::invalid(format!("{} deferred offsets left unresolved", self.pending)));
        }
        Ok(self.bytes)
    }
}

impl Write for DeferredBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
