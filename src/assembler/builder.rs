//! Container builder state machine.
//!
//! A build moves through `Empty -> Accumulating -> SizesFinalized ->
//! OffsetsPatched -> Framed -> Written` and never backwards. Chunks are
//! kept in push order; the layout of the container kind is checked on
//! every push and once more when sizes are finalized.

use std::fmt;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, trace};

use super::write::write_atomic;
use crate::containers::ContainerKind;
use crate::format::{ChunkFramer, Tag, CHUNK_HEADER_SIZE};
use crate::util::{to_u32, Error, Result};

/// Build progress of one container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildState {
    Empty,
    Accumulating,
    SizesFinalized,
    OffsetsPatched,
    Framed,
    Written,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "Empty",
            Self::Accumulating => "Accumulating",
            Self::SizesFinalized => "SizesFinalized",
            Self::OffsetsPatched => "OffsetsPatched",
            Self::Framed => "Framed",
            Self::Written => "Written",
        };
        f.write_str(name)
    }
}

/// Position a chunk offset is measured from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetBase {
    /// Start of the file.
    File,
    /// First payload byte of the chunk at this index.
    PayloadOf(usize),
}

/// Value written by a fixup once chunk positions are known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FixupValue {
    /// Position of the target chunk's tag, relative to `base`.
    ChunkOffset { target: usize, base: OffsetBase },
    /// Full frame size (header included) of the target chunk.
    FrameSize { target: usize },
}

/// A u32 patched into a chunk payload after sizes are finalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fixup {
    /// Index of the chunk holding the field.
    pub chunk: usize,
    /// Byte position of the field within that chunk's payload.
    pub at: usize,
    pub value: FixupValue,
}

impl Fixup {
    /// Patch `chunk[at]` with the file offset of `target`.
    pub fn file_offset(chunk: usize, at: usize, target: usize) -> Self {
        Self {
            chunk,
            at,
            value: FixupValue::ChunkOffset {
                target,
                base: OffsetBase::File,
            },
        }
    }

    /// Patch `chunk[at]` with the offset of `target` relative to the payload of `base`.
    pub fn relative_offset(chunk: usize, at: usize, target: usize, base: usize) -> Self {
        Self {
            chunk,
            at,
            value: FixupValue::ChunkOffset {
                target,
                base: OffsetBase::PayloadOf(base),
            },
        }
    }

    /// Patch `chunk[at]` with the frame size of `target`.
    pub fn frame_size(chunk: usize, at: usize, target: usize) -> Self {
        Self {
            chunk,
            at,
            value: FixupValue::FrameSize { target },
        }
    }
}

#[derive(Debug)]
struct PendingChunk {
    tag: Tag,
    payload: Vec<u8>,
}

/// Ordered chunk set of one container, framed into a byte stream.
#[derive(Debug)]
pub struct ContainerBuilder {
    kind: ContainerKind,
    framer: ChunkFramer,
    state: BuildState,
    chunks: Vec<PendingChunk>,
    fixups: Vec<Fixup>,
    positions: Vec<usize>,
    total: usize,
    bytes: Vec<u8>,
}

impl ContainerBuilder {
    /// Start an empty build for `kind`, framed in the kind's tag order.
    pub fn new(kind: ContainerKind) -> Self {
        Self::with_framer(kind, ChunkFramer::new(kind.tag_order()))
    }

    /// Start an empty build with a hand-configured framer.
    pub fn with_framer(kind: ContainerKind, framer: ChunkFramer) -> Self {
        Self {
            kind,
            framer,
            state: BuildState::Empty,
            chunks: Vec::new(),
            fixups: Vec::new(),
            positions: Vec::new(),
            total: 0,
            bytes: Vec::new(),
        }
    }

    #[inline]
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    #[inline]
    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Number of chunks pushed so far.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn expect_state(&self, allowed: &[BuildState]) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        let expected = allowed.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(" or ");
        Err(Error::InvalidState {
            expected,
            actual: self.state.to_string(),
        })
    }

    /// Append a chunk and return its index.
    ///
    /// Fails with [`Error::ChunkOrder`] when the tag breaks the kind's layout.
    pub fn push_chunk(&mut self, tag: Tag, payload: Vec<u8>) -> Result<usize> {
        self.expect_state(&[BuildState::Empty, BuildState::Accumulating])?;
        to_u32(payload.len())?;
        let mut tags: Vec<Tag> = self.chunks.iter().map(|c| c.tag).collect();
        tags.push(tag);
        self.kind.layout().check(&tags, false)?;

        trace!(container = %self.kind, chunk = %tag, len = payload.len(), "push chunk");
        self.chunks.push(PendingChunk { tag, payload });
        self.state = BuildState::Accumulating;
        Ok(self.chunks.len() - 1)
    }

    /// Record a cross-chunk patch applied by [`Self::patch_offsets`].
    pub fn add_fixup(&mut self, fixup: Fixup) -> Result<()> {
        self.expect_state(&[BuildState::Accumulating])?;
        let in_range = |i: usize| i < self.chunks.len();
        let target_ok = match fixup.value {
            FixupValue::ChunkOffset { target, base } => {
                in_range(target)
                    && match base {
                        OffsetBase::File => true,
                        OffsetBase::PayloadOf(b) => in_range(b),
                    }
            }
            FixupValue::FrameSize { target } => in_range(target),
        };
        if !in_range(fixup.chunk) || !target_ok {
            return Err(Error::invalid(format!("fixup references a missing chunk: {:?}", fixup)));
        }
        if fixup.at + 4 > self.chunks[fixup.chunk].payload.len() {
            return Err(Error::invalid(format!(
                "fixup at {} lies outside the {} payload",
                fixup.at, self.chunks[fixup.chunk].tag
            )));
        }
        self.fixups.push(fixup);
        Ok(())
    }

    /// Check the complete layout and compute every chunk's file position.
    pub fn finalize_sizes(&mut self) -> Result<()> {
        self.expect_state(&[BuildState::Accumulating])?;
        let tags: Vec<Tag> = self.chunks.iter().map(|c| c.tag).collect();
        self.kind.layout().check(&tags, true)?;

        let mut pos = 0usize;
        self.positions.clear();
        for chunk in &self.chunks {
            self.positions.push(pos);
            pos += CHUNK_HEADER_SIZE + chunk.payload.len();
        }
        self.total = pos;
        to_u32(self.total)?;
        self.state = BuildState::SizesFinalized;
        Ok(())
    }

    /// File position of the tag of chunk `index`.
    pub fn chunk_offset(&self, index: usize) -> Result<usize> {
        if self.state < BuildState::SizesFinalized {
            return Err(Error::InvalidState {
                expected: BuildState::SizesFinalized.to_string(),
                actual: self.state.to_string(),
            });
        }
        self.positions
            .get(index)
            .copied()
            .ok_or_else(|| Error::invalid(format!("no chunk at index {}", index)))
    }

    fn fixup_value(&self, value: FixupValue) -> Result<u32> {
        match value {
            FixupValue::ChunkOffset { target, base } => {
                let target_pos = self.positions[target];
                let base_pos = match base {
                    OffsetBase::File => 0,
                    OffsetBase::PayloadOf(b) => self.positions[b] + CHUNK_HEADER_SIZE,
                };
                let rel = target_pos
                    .checked_sub(base_pos)
                    .ok_or_else(|| Error::invalid("fixup target precedes its base"))?;
                to_u32(rel)
            }
            FixupValue::FrameSize { target } => to_u32(CHUNK_HEADER_SIZE + self.chunks[target].payload.len()),
        }
    }

    /// Apply every recorded fixup.
    pub fn patch_offsets(&mut self) -> Result<()> {
        self.expect_state(&[BuildState::SizesFinalized])?;
        for i in 0..self.fixups.len() {
            let fixup = self.fixups[i];
            let value = self.fixup_value(fixup.value)?;
            let payload = &mut self.chunks[fixup.chunk].payload;
            LittleEndian::write_u32(&mut payload[fixup.at..fixup.at + 4], value);
        }
        debug!(container = %self.kind, fixups = self.fixups.len(), "offsets patched");
        self.state = BuildState::OffsetsPatched;
        Ok(())
    }

    /// Concatenate the framed chunks.
    pub fn frame(&mut self) -> Result<&[u8]> {
        self.expect_state(&[BuildState::OffsetsPatched])?;
        let mut out = Vec::with_capacity(self.total);
        for chunk in &self.chunks {
            self.framer.write_header(&mut out, chunk.tag, chunk.payload.len())?;
            out.extend_from_slice(&chunk.payload);
        }
        self.bytes = out;
        self.state = BuildState::Framed;
        debug!(container = %self.kind, chunks = self.chunks.len(), bytes = self.bytes.len(), "container framed");
        Ok(&self.bytes)
    }

    /// Run every step up to [`BuildState::Framed`].
    pub fn assemble(&mut self) -> Result<&[u8]> {
        self.finalize_sizes()?;
        self.patch_offsets()?;
        self.frame()
    }

    /// Framed bytes. Empty before [`Self::frame`].
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Write the framed bytes to `path`.
    ///
    /// A failed write keeps the builder framed so it can be retried.
    pub fn write_to(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.expect_state(&[BuildState::Framed])?;
        write_atomic(path.as_ref(), &self.bytes)?;
        self.state = BuildState::Written;
        Ok(())
    }

    /// Consume a framed builder and return its bytes.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        self.expect_state(&[BuildState::Framed, BuildState::Written])?;
        Ok(self.bytes)
    }
}

/// Frame `chunks` in order for `kind`.
pub fn assemble(kind: ContainerKind, chunks: impl IntoIterator<Item = (Tag, Vec<u8>)>) -> Result<Vec<u8>> {
    let mut builder = ContainerBuilder::new(kind);
    for (tag, payload) in chunks {
        builder.push_chunk(tag, payload)?;
    }
    builder.assemble()?;
    builder.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{read_chunks, tags, TagOrder};

    fn wdl_chunks() -> Vec<(Tag, Vec<u8>)> {
        vec![
            (tags::MVER, 18u32.to_le_bytes().to_vec()),
            (tags::MWMO, Vec::new()),
            (tags::MWID, Vec::new()),
            (tags::MODF, Vec::new()),
            (tags::MAOF, vec![0; 16]),
        ]
    }

    #[test]
    fn test_assemble_keeps_order() {
        let bytes = assemble(ContainerKind::Wdl, wdl_chunks()).unwrap();
        assert_eq!(&bytes[0..4], b"REVM");
        let chunks = read_chunks(&bytes, TagOrder::Reversed).unwrap();
        let found: Vec<Tag> = chunks.iter().map(|c| c.tag).collect();
        assert_eq!(found, vec![tags::MVER, tags::MWMO, tags::MWID, tags::MODF, tags::MAOF]);
    }

    #[test]
    fn test_out_of_order_push() {
        let mut b = ContainerBuilder::new(ContainerKind::Wdt);
        b.push_chunk(tags::MVER, vec![0; 4]).unwrap();
        assert!(matches!(b.push_chunk(tags::MAIN, vec![]), Err(Error::ChunkOrder(_))));
        assert_eq!(b.chunk_count(), 1);
    }

    #[test]
    fn test_missing_required_at_finalize() {
        let mut b = ContainerBuilder::new(ContainerKind::Wdt);
        b.push_chunk(tags::MVER, vec![0; 4]).unwrap();
        assert!(b.finalize_sizes().is_err());
        assert_eq!(b.state(), BuildState::Accumulating);
    }

    #[test]
    fn test_state_machine_order() {
        let mut b = ContainerBuilder::new(ContainerKind::Wdl);
        assert!(matches!(b.finalize_sizes(), Err(Error::InvalidState { .. })));
        assert!(b.frame().is_err());
        for (tag, payload) in wdl_chunks() {
            b.push_chunk(tag, payload).unwrap();
        }
        assert!(b.patch_offsets().is_err());
        b.finalize_sizes().unwrap();
        assert_eq!(b.state(), BuildState::SizesFinalized);
        assert!(b.push_chunk(tags::MARE, vec![]).is_err());
        b.patch_offsets().unwrap();
        b.frame().unwrap();
        assert_eq!(b.state(), BuildState::Framed);
        assert!(b.finalize_sizes().is_err());
    }

    #[test]
    fn test_fixups() {
        let mut b = ContainerBuilder::new(ContainerKind::Wdl);
        let mut ids = Vec::new();
        for (tag, payload) in wdl_chunks() {
            ids.push(b.push_chunk(tag, payload).unwrap());
        }
        let mare = b.push_chunk(tags::MARE, vec![1; 10]).unwrap();
        let maof = ids[4];
        b.add_fixup(Fixup::file_offset(maof, 0, mare)).unwrap();
        b.add_fixup(Fixup::relative_offset(maof, 4, mare, maof)).unwrap();
        b.add_fixup(Fixup::frame_size(maof, 8, mare)).unwrap();
        assert!(b.add_fixup(Fixup::file_offset(maof, 14, mare)).is_err());
        assert!(b.add_fixup(Fixup::file_offset(maof, 0, 99)).is_err());

        let bytes = b.assemble().unwrap().to_vec();
        let chunks = read_chunks(&bytes, TagOrder::Reversed).unwrap();
        let maof_payload = chunks[4].payload;
        let abs = LittleEndian::read_u32(&maof_payload[0..4]) as usize;
        assert_eq!(abs, chunks[5].offset);
        assert_eq!(&bytes[abs..abs + 4], b"ERAM");
        let rel = LittleEndian::read_u32(&maof_payload[4..8]) as usize;
        assert_eq!(rel, chunks[5].offset - chunks[4].payload_offset());
        assert_eq!(LittleEndian::read_u32(&maof_payload[8..12]), 18);
    }

    #[test]
    fn test_negative_relative_offset() {
        let mut b = ContainerBuilder::new(ContainerKind::Wdl);
        for (tag, payload) in wdl_chunks() {
            b.push_chunk(tag, payload).unwrap();
        }
        b.add_fixup(Fixup::relative_offset(4, 0, 0, 4)).unwrap();
        b.finalize_sizes().unwrap();
        assert!(b.patch_offsets().is_err());
    }

    #[test]
    fn test_chunk_offset() {
        let mut b = ContainerBuilder::new(ContainerKind::Wdl);
        for (tag, payload) in wdl_chunks() {
            b.push_chunk(tag, payload).unwrap();
        }
        assert!(b.chunk_offset(0).is_err());
        b.finalize_sizes().unwrap();
        assert_eq!(b.chunk_offset(0).unwrap(), 0);
        assert_eq!(b.chunk_offset(1).unwrap(), 12);
        assert!(b.chunk_offset(9).is_err());
    }

    #[test]
    fn test_write_to() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("test.wdl");
        let mut b = ContainerBuilder::new(ContainerKind::Wdl);
        for (tag, payload) in wdl_chunks() {
            b.push_chunk(tag, payload).unwrap();
        }
        assert!(b.write_to(&path).is_err());
        b.assemble().unwrap();
        b.write_to(&path).unwrap();
        assert_eq!(b.state(), BuildState::Written);
        assert_eq!(std::fs::read(&path).unwrap(), b.bytes());
    }
}
