//! Relocatable arrays: a `{count, offset}` header plus a trailing data block.
//!
//! The header is emitted where the owning record lives; the data block is
//! appended later and the header is back-patched through deferred slots.
//! An empty array is written as `count = 0, offset = 0` and appends nothing.

use super::deferred::{DeferredBuffer, Placeholder};
use crate::util::{to_u32, Encodable, Result};

/// Size of an array header (count u32 + offset u32).
pub const ARRAY_HEADER_SIZE: usize = 8;

/// Alignment of data blocks inside model files.
pub const MODEL_DATA_ALIGNMENT: usize = 16;

/// Reserved header of one relocatable array.
#[derive(Debug)]
#[must_use = "a reserved array header must be resolved"]
pub struct ArraySlot {
    count: Placeholder,
    offset: Placeholder,
}

impl ArraySlot {
    /// Reserve an 8-byte header at the current buffer position.
    pub fn reserve(buf: &mut DeferredBuffer) -> Self {
        let count = buf.reserve_u32();
        let offset = buf.reserve_u32();
        Self { count, offset }
    }

    /// Patch the header with an explicit count and offset.
    pub fn resolve(self, buf: &mut DeferredBuffer, count: u32, offset: u32) {
        buf.resolve(self.count, count);
        buf.resolve(self.offset, offset);
    }

    /// Patch the header of an array with no elements.
    pub fn resolve_empty(self, buf: &mut DeferredBuffer) {
        self.resolve(buf, 0, 0);
    }

    /// Align, then patch the header to point at the current position.
    ///
    /// For `count == 0` the header becomes `0, 0` and the buffer is left
    /// untouched.
    pub fn begin_data(self, buf: &mut DeferredBuffer, count: usize, alignment: usize) -> Result<()> {
        if count == 0 {
            self.resolve_empty(buf);
            return Ok(());
        }
        buf.align(alignment);
        let offset = buf.position()?;
        self.resolve(buf, to_u32(count)?, offset);
        Ok(())
    }

    /// Append fixed-width elements and point the header at them.
    pub fn write_elements<T: Encodable>(self, buf: &mut DeferredBuffer, items: &[T], alignment: usize) -> Result<()> {
        self.begin_data(buf, items.len(), alignment)?;
        for item in items {
            buf.put(item)?;
        }
        Ok(())
    }

    /// Append records, then their nested payloads, and point the header at the records.
    pub fn write_records<T: Record>(self, buf: &mut DeferredBuffer, items: &[T], alignment: usize) -> Result<()> {
        self.begin_data(buf, items.len(), alignment)?;
        let mut pending = Vec::with_capacity(items.len());
        for item in items {
            pending.push(item.write_record(buf)?);
        }
        for (item, p) in items.iter().zip(pending) {
            item.write_payload(p, buf, alignment)?;
        }
        Ok(())
    }
}

/// Element that carries nested relocatable data of its own.
///
/// Records are laid out in two steps: the fixed-size records of a whole
/// array first, then each record's nested payload in array order.
pub trait Record {
    /// Size in bytes of the fixed part.
    const RECORD_SIZE: usize;

    /// Slots reserved by the fixed part, resolved by [`Record::write_payload`].
    type Pending;

    /// Write the fixed part, reserving slots for nested data.
    fn write_record(&self, buf: &mut DeferredBuffer) -> Result<Self::Pending>;

    /// Append nested data and resolve the slots from `write_record`.
    fn write_payload(&self, pending: Self::Pending, buf: &mut DeferredBuffer, alignment: usize) -> Result<()>;
}

/// Ordered collection encoded as a relocatable array.
#[derive(Clone, Debug, PartialEq)]
pub struct RelocatableArray<T> {
    elements: Vec<T>,
}

impl<T> Default for RelocatableArray<T> {
    fn default() -> Self {
        Self { elements: Vec::new() }
    }
}

impl<T> From<Vec<T>> for RelocatableArray<T> {
    fn from(elements: Vec<T>) -> Self {
        Self { elements }
    }
}

impl<T> RelocatableArray<T> {
    /// Create an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element. Insertion order is preserved.
    #[inline]
    pub fn push(&mut self, value: T) {
        self.elements.push(value);
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if the array has no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements in insertion order.
    #[inline]
    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    /// Reserve this array's header at the current position.
    #[inline]
    pub fn write_header(&self, buf: &mut DeferredBuffer) -> ArraySlot {
        ArraySlot::reserve(buf)
    }

    /// Header bytes for a data block placed at `data_offset`.
    pub fn header_bytes(&self, data_offset: u32) -> Result<[u8; ARRAY_HEADER_SIZE]> {
        let count = to_u32(self.len())?;
        let offset = if count == 0 { 0 } else { data_offset };
        let mut out = [0u8; ARRAY_HEADER_SIZE];
        out[0..4].copy_from_slice(&count.to_le_bytes());
        out[4..8].copy_from_slice(&offset.to_le_bytes());
        Ok(out)
    }
}

impl<T: Encodable> RelocatableArray<T> {
    /// Size of the data block in bytes.
    #[inline]
    pub fn data_len(&self) -> usize {
        self.elements.len() * T::BYTE_WIDTH
    }

    /// Serialized elements, back to back.
    pub fn data_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.data_len());
        for e in &self.elements {
            e.encode(&mut out)?;
        }
        Ok(out)
    }

    /// Append the data block and resolve `slot` to point at it.
    pub fn write_data(&self, slot: ArraySlot, buf: &mut DeferredBuffer, alignment: usize) -> Result<()> {
        slot.write_elements(buf, &self.elements, alignment)
    }
}

impl<T: Record> RelocatableArray<T> {
    /// Append all fixed records, then each record's nested payload.
    pub fn write_records(&self, slot: ArraySlot, buf: &mut DeferredBuffer, alignment: usize) -> Result<()> {
        slot.write_records(buf, &self.elements, alignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{ByteOrder, LittleEndian};

    fn read_header(bytes: &[u8], at: usize) -> (u32, u32) {
        (
            LittleEndian::read_u32(&bytes[at..at + 4]),
            LittleEndian::read_u32(&bytes[at + 4..at + 8]),
        )
    }

    #[test]
    fn test_header_points_at_data() {
        let arr: RelocatableArray<u16> = vec![1, 2, 3].into();
        let mut buf = DeferredBuffer::new();
        buf.put_u32(0xFFFF_FFFF).unwrap();
        let slot = arr.write_header(&mut buf);
        arr.write_data(slot, &mut buf, MODEL_DATA_ALIGNMENT).unwrap();
        let bytes = buf.finish().unwrap();

        let (count, offset) = read_header(&bytes, 4);
        assert_eq!(count, 3);
        assert_eq!(offset, 16);
        assert_eq!(&bytes[16..22], &[1, 0, 2, 0, 3, 0]);
    }

    #[test]
    fn test_empty_array_writes_nothing() {
        let arr: RelocatableArray<u32> = RelocatableArray::new();
        let mut buf = DeferredBuffer::new();
        let slot = arr.write_header(&mut buf);
        arr.write_data(slot, &mut buf, MODEL_DATA_ALIGNMENT).unwrap();
        let bytes = buf.finish().unwrap();
        assert_eq!(bytes.len(), ARRAY_HEADER_SIZE);
        assert_eq!(read_header(&bytes, 0), (0, 0));
    }

    #[test]
    fn test_header_bytes_contract() {
        let mut arr = RelocatableArray::new();
        arr.push(5u32);
        arr.push(6u32);
        assert_eq!(arr.header_bytes(64).unwrap(), [2, 0, 0, 0, 64, 0, 0, 0]);
        assert_eq!(arr.data_bytes().unwrap(), vec![5, 0, 0, 0, 6, 0, 0, 0]);
        let empty: RelocatableArray<u32> = RelocatableArray::new();
        assert_eq!(empty.header_bytes(64).unwrap(), [0; 8]);
    }

    #[test]
    fn test_insertion_order_kept() {
        let mut arr = RelocatableArray::new();
        for v in [3u16, 1, 3, 2] {
            arr.push(v);
        }
        assert_eq!(arr.elements(), &[3, 1, 3, 2]);
    }

    struct Named(&'static str);

    impl Record for Named {
        const RECORD_SIZE: usize = 8;
        type Pending = ArraySlot;

        fn write_record(&self, buf: &mut DeferredBuffer) -> Result<ArraySlot> {
            Ok(ArraySlot::reserve(buf))
        }

        fn write_payload(&self, pending: ArraySlot, buf: &mut DeferredBuffer, alignment: usize) -> Result<()> {
            pending.begin_data(buf, self.0.len(), alignment)?;
            buf.put_bytes(self.0.as_bytes());
            Ok(())
        }
    }

    #[test]
    fn test_records_then_payloads() {
        let arr: RelocatableArray<Named> = vec![Named("ab"), Named("cde")].into();
        let mut buf = DeferredBuffer::new();
        let slot = arr.write_header(&mut buf);
        arr.write_records(slot, &mut buf, 4).unwrap();
        let bytes = buf.finish().unwrap();

        assert_eq!(read_header(&bytes, 0), (2, 8));
        let (len0, off0) = read_header(&bytes, 8);
        let (len1, off1) = read_header(&bytes, 16);
        assert_eq!(&bytes[off0 as usize..(off0 + len0) as usize], b"ab");
        assert_eq!(&bytes[off1 as usize..(off1 + len1) as usize], b"cde");
        assert_eq!(off1 % 4, 0);
    }
}
