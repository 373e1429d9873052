//! Append-only string tables.
//!
//! Each insertion appends the text and one NUL and returns the offset the
//! text starts at. Nothing is deduplicated: the same name inserted twice
//! occupies two positions, and consumers index by position.

use crate::util::{to_u32, Result};

/// Blob of NUL-terminated strings with per-insertion offsets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StringTable {
    blob: Vec<u8>,
    offsets: Vec<u32>,
    alignment: usize,
}

impl StringTable {
    /// Create a table with no entry padding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table whose entries are NUL-padded to a multiple of `alignment`.
    pub fn aligned(alignment: usize) -> Self {
        Self {
            alignment,
            ..Self::default()
        }
    }

    /// Create a table whose blob starts with `prefix`.
    ///
    /// Group name tables reserve their first bytes so offset 0 never names a group.
    pub fn with_prefix(prefix: &[u8]) -> Self {
        Self {
            blob: prefix.to_vec(),
            ..Self::default()
        }
    }

    /// Append `text` plus NUL and return the offset of its first byte.
    pub fn insert(&mut self, text: &str) -> Result<u32> {
        let offset = to_u32(self.blob.len())?;
        self.blob.extend_from_slice(text.as_bytes());
        self.blob.push(0);
        if self.alignment > 1 {
            let rem = self.blob.len() % self.alignment;
            if rem != 0 {
                self.blob.resize(self.blob.len() + self.alignment - rem, 0);
            }
        }
        self.offsets.push(offset);
        Ok(offset)
    }

    /// Append a trailing run of NUL bytes after the last entry.
    pub fn terminate_with(&mut self, count: usize) {
        self.blob.resize(self.blob.len() + count, 0);
    }

    /// Offsets returned by every insertion, in order.
    #[inline]
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Number of insertions.
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Check if nothing was inserted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// The table bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.blob
    }

    /// Consume the table and return its bytes.
    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.blob
    }

    /// Read the NUL-terminated string starting at `offset`.
    pub fn get(&self, offset: u32) -> Option<&str> {
        read_cstr(&self.blob, offset as usize)
    }
}

/// Read a NUL-terminated UTF-8 string from `bytes` at `offset`.
pub fn read_cstr(bytes: &[u8], offset: usize) -> Option<&str> {
    let tail = bytes.get(offset..)?;
    let end = tail.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&tail[..end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_offsets() {
        let mut table = StringTable::new();
        assert_eq!(table.insert("wall01").unwrap(), 0);
        assert_eq!(table.insert("floor").unwrap(), 7);
        assert_eq!(table.as_bytes(), b"wall01\0floor\0");
        assert_eq!(table.get(7), Some("floor"));
    }

    #[test]
    fn test_no_dedup() {
        let mut table = StringTable::new();
        let a = table.insert("same").unwrap();
        let b = table.insert("same").unwrap();
        assert_ne!(a, b);
        assert_eq!(table.as_bytes(), b"same\0same\0");
        assert_eq!(table.offsets(), &[0, 5]);
    }

    #[test]
    fn test_aligned_entries() {
        let mut table = StringTable::aligned(4);
        assert_eq!(table.insert("ab").unwrap(), 0);
        assert_eq!(table.insert("abcd").unwrap(), 4);
        assert_eq!(table.as_bytes().len(), 12);
        table.terminate_with(4);
        assert_eq!(table.as_bytes().len(), 16);
    }

    #[test]
    fn test_prefix() {
        let mut table = StringTable::with_prefix(b"\0\0");
        assert_eq!(table.insert("group").unwrap(), 2);
    }

    #[test]
    fn test_empty_string() {
        let mut table = StringTable::new();
        assert_eq!(table.insert("").unwrap(), 0);
        assert_eq!(table.as_bytes(), b"\0");
        assert_eq!(table.get(0), Some(""));
    }
}
