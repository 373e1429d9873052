//! Chunk frame reader.
//!
//! Parses produced containers back into frames. Used by the inspector CLI
//! and by tests that check layout and offsets.

#[cfg(feature = "mmap")]
use std::fs::File;
#[cfg(feature = "mmap")]
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
#[cfg(feature = "mmap")]
use memmap2::Mmap;

use super::chunk::{Tag, TagOrder, CHUNK_HEADER_SIZE};
use crate::util::{Error, Result};

/// A frame borrowed from a parsed byte stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkRef<'a> {
    /// Tag in reading order.
    pub tag: Tag,
    /// Position of the frame header within the parsed stream.
    pub offset: usize,
    /// Frame payload.
    pub payload: &'a [u8],
}

impl ChunkRef<'_> {
    /// Position of the first payload byte.
    #[inline]
    pub fn payload_offset(&self) -> usize {
        self.offset + CHUNK_HEADER_SIZE
    }

    /// Total frame size including the header.
    #[inline]
    pub fn frame_len(&self) -> usize {
        CHUNK_HEADER_SIZE + self.payload.len()
    }
}

/// Parse a flat concatenation of frames.
pub fn read_chunks(bytes: &[u8], order: TagOrder) -> Result<Vec<ChunkRef<'_>>> {
    read_chunks_at(bytes, order, 0)
}

/// Parse frames nested inside a payload.
///
/// `base` is the stream position of `payload`, so reported offsets stay
/// absolute.
pub fn read_subchunks<'a>(payload: &'a [u8], base: usize, order: TagOrder) -> Result<Vec<ChunkRef<'a>>> {
    read_chunks_at(payload, order, base)
}

fn read_chunks_at(bytes: &[u8], order: TagOrder, base: usize) -> Result<Vec<ChunkRef<'_>>> {
    let mut chunks = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        if pos + CHUNK_HEADER_SIZE > bytes.len() {
            return Err(Error::UnexpectedEof((base + pos) as u64));
        }
        let disk: [u8; 4] = [bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]];
        let len = LittleEndian::read_u32(&bytes[pos + 4..pos + 8]) as usize;
        let start = pos + CHUNK_HEADER_SIZE;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= bytes.len())
            .ok_or(Error::UnexpectedEof((base + bytes.len()) as u64))?;
        chunks.push(ChunkRef {
            tag: Tag::from_disk(disk, order),
            offset: base + pos,
            payload: &bytes[start..end],
        });
        pos = end;
    }
    Ok(chunks)
}

/// Find the first chunk with `tag`.
pub fn find_chunk<'a, 'b>(chunks: &'b [ChunkRef<'a>], tag: Tag) -> Option<&'b ChunkRef<'a>> {
    chunks.iter().find(|c| c.tag == tag)
}

/// Read a u16 at `pos`.
pub fn read_u16_at(bytes: &[u8], pos: usize) -> Result<u16> {
    bytes
        .get(pos..pos + 2)
        .map(LittleEndian::read_u16)
        .ok_or(Error::UnexpectedEof(pos as u64))
}

/// Read an i16 at `pos`.
pub fn read_i16_at(bytes: &[u8], pos: usize) -> Result<i16> {
    bytes
        .get(pos..pos + 2)
        .map(LittleEndian::read_i16)
        .ok_or(Error::UnexpectedEof(pos as u64))
}

/// Read a u32 at `pos`.
pub fn read_u32_at(bytes: &[u8], pos: usize) -> Result<u32> {
    bytes
        .get(pos..pos + 4)
        .map(LittleEndian::read_u32)
        .ok_or(Error::UnexpectedEof(pos as u64))
}

/// Read an i32 at `pos`.
pub fn read_i32_at(bytes: &[u8], pos: usize) -> Result<i32> {
    bytes
        .get(pos..pos + 4)
        .map(LittleEndian::read_i32)
        .ok_or(Error::UnexpectedEof(pos as u64))
}

/// Read an f32 at `pos`.
pub fn read_f32_at(bytes: &[u8], pos: usize) -> Result<f32> {
    bytes
        .get(pos..pos + 4)
        .map(LittleEndian::read_f32)
        .ok_or(Error::UnexpectedEof(pos as u64))
}

/// Read a `{count, offset}` array header at `pos`.
pub fn read_array_header(bytes: &[u8], pos: usize) -> Result<(u32, u32)> {
    Ok((read_u32_at(bytes, pos)?, read_u32_at(bytes, pos + 4)?))
}

/// A container file opened for inspection.
#[cfg(feature = "mmap")]
pub struct ContainerFile {
    map: Mmap,
}

#[cfg(feature = "mmap")]
impl ContainerFile {
    /// Memory-map a file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        // Safety: the file is opened read-only and only read through the map.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapFailed(e.to_string()))?;
        Ok(Self { map })
    }

    /// Whole file contents.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    /// Parse the file as a flat list of frames.
    pub fn chunks(&self, order: TagOrder) -> Result<Vec<ChunkRef<'_>>> {
        read_chunks(&self.map, order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::chunk::{tags, ChunkFramer};

    #[test]
    fn test_round_trip() {
        let framer = ChunkFramer::new(TagOrder::Reversed);
        let mut stream = framer.frame(tags::MVER, &18u32.to_le_bytes()).unwrap();
        stream.extend(framer.frame(tags::MWMO, b"").unwrap());
        stream.extend(framer.frame(tags::MAOF, &[7; 12]).unwrap());

        let chunks = read_chunks(&stream, TagOrder::Reversed).unwrap();
        let found: Vec<Tag> = chunks.iter().map(|c| c.tag).collect();
        assert_eq!(found, vec![tags::MVER, tags::MWMO, tags::MAOF]);
        assert_eq!(chunks[1].offset, 12);
        assert!(chunks[1].payload.is_empty());
        assert_eq!(chunks[2].payload, &[7; 12]);
        assert_eq!(chunks[2].payload_offset(), 28);
    }

    #[test]
    fn test_truncated_payload() {
        let framer = ChunkFramer::new(TagOrder::Literal);
        let mut stream = framer.frame(tags::MD21, &[1, 2, 3, 4]).unwrap();
        stream.pop();
        assert!(matches!(read_chunks(&stream, TagOrder::Literal), Err(Error::UnexpectedEof(_))));
    }

    #[test]
    fn test_truncated_header() {
        assert!(read_chunks(b"REVM\x04\x00", TagOrder::Reversed).is_err());
        assert!(read_chunks(b"", TagOrder::Reversed).unwrap().is_empty());
    }

    #[test]
    fn test_readers_bounds() {
        let bytes = [1u8, 0, 0, 0, 2, 0, 0, 0];
        assert_eq!(read_array_header(&bytes, 0).unwrap(), (1, 2));
        assert!(read_u32_at(&bytes, 6).is_err());
        assert_eq!(read_u16_at(&bytes, 4).unwrap(), 2);
    }

    #[cfg(feature = "mmap")]
    #[test]
    fn test_container_file() {
        use std::io::Write;

        let framer = ChunkFramer::new(TagOrder::Reversed);
        let bytes = framer.frame(tags::MVER, &17u32.to_le_bytes()).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let opened = ContainerFile::open(file.path()).unwrap();
        assert_eq!(opened.bytes(), bytes.as_slice());
        let chunks = opened.chunks(TagOrder::Reversed).unwrap();
        assert_eq!(chunks[0].tag, tags::MVER);
        assert!(matches!(ContainerFile::open("/nonexistent/hut.wmo"), Err(Error::FileNotFound(_))));
    }
}
