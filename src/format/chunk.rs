//! Chunk tags and tag-and-length framing.
//!
//! A chunk on disk is `tag[4] | length u32 LE | payload[length]`. Map and
//! world-object containers store the tag byte-reversed ("MVER" is written
//! `REVM`); chunked models store it in literal order. The order is a
//! property of the framer, fixed when it is built for a container kind.

use std::fmt;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::util::{to_u32, Error, Result};

/// Size of a chunk frame header (tag + length).
pub const CHUNK_HEADER_SIZE: usize = 8;

/// Four-character chunk identifier, held in reading order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    /// Build a tag from a four-byte literal. Usable in constants.
    #[inline]
    pub const fn from_bytes(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }

    /// Parse a tag, rejecting anything that is not exactly four bytes.
    pub fn parse(text: &str) -> Result<Self> {
        let bytes = text.as_bytes();
        let arr: [u8; 4] = bytes
            .try_into()
            .map_err(|_| Error::MalformedTag(text.to_string()))?;
        Ok(Self(arr))
    }

    /// Best-effort tag: truncated or NUL-padded to four bytes.
    pub fn lossy(text: &str) -> Self {
        let mut arr = [0u8; 4];
        for (dst, src) in arr.iter_mut().zip(text.bytes()) {
            *dst = src;
        }
        Self(arr)
    }

    /// Tag bytes in the given on-disk order.
    #[inline]
    pub fn to_disk(self, order: TagOrder) -> [u8; 4] {
        match order {
            TagOrder::Literal => self.0,
            TagOrder::Reversed => {
                let [a, b, c, d] = self.0;
                [d, c, b, a]
            }
        }
    }

    /// Recover a tag from on-disk bytes.
    #[inline]
    pub fn from_disk(bytes: [u8; 4], order: TagOrder) -> Self {
        // Reversal is its own inverse.
        Self(Self(bytes).to_disk(order))
    }

    /// Tag as text, with non-printable bytes escaped.
    pub fn as_string(&self) -> String {
        self.0.escape_ascii().to_string()
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.as_string())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// Byte order of a tag in the container file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TagOrder {
    /// Tag written as read: `MD21`.
    Literal,
    /// Tag written last byte first: `MVER` becomes `REVM`.
    #[default]
    Reversed,
}

/// Frames payloads for one container kind.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChunkFramer {
    order: TagOrder,
    strict: bool,
}

impl ChunkFramer {
    /// Create a lenient framer with the given tag order.
    pub const fn new(order: TagOrder) -> Self {
        Self { order, strict: false }
    }

    /// Treat malformed tags as fatal.
    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Tag order this framer writes.
    #[inline]
    pub fn order(&self) -> TagOrder {
        self.order
    }

    /// Whether malformed tags are fatal.
    #[inline]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Write a frame header for a payload of `len` bytes.
    pub fn write_header(&self, out: &mut Vec<u8>, tag: Tag, len: usize) -> Result<()> {
        out.extend_from_slice(&tag.to_disk(self.order));
        out.write_u32::<LittleEndian>(to_u32(len)?)?;
        Ok(())
    }

    /// Frame a payload under a validated tag.
    pub fn frame(&self, tag: Tag, payload: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(CHUNK_HEADER_SIZE + payload.len());
        self.write_header(&mut out, tag, payload.len())?;
        out.extend_from_slice(payload);
        tracing::trace!(tag = %tag, len = payload.len(), "framed chunk");
        Ok(out)
    }

    /// Frame a payload under a textual tag.
    ///
    /// A tag that is not four bytes is an error in strict mode. Otherwise it
    /// is logged and a best-effort frame with the truncated or padded tag is
    /// returned.
    pub fn wrap(&self, tag: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let tag = match Tag::parse(tag) {
            Ok(tag) => tag,
            Err(e) if self.strict => return Err(e),
            Err(e) => {
                tracing::error!(tag, error = %e, "framing chunk with malformed tag");
                Tag::lossy(tag)
            }
        };
        self.frame(tag, payload)
    }
}

/// Tags used across the supported containers.
pub mod tags {
    use super::Tag;

    pub const MVER: Tag = Tag::from_bytes(b"MVER");

    pub const MPHD: Tag = Tag::from_bytes(b"MPHD");
    pub const MAIN: Tag = Tag::from_bytes(b"MAIN");
    pub const MWMO: Tag = Tag::from_bytes(b"MWMO");
    pub const MWID: Tag = Tag::from_bytes(b"MWID");
    pub const MODF: Tag = Tag::from_bytes(b"MODF");
    pub const MAOF: Tag = Tag::from_bytes(b"MAOF");
    pub const MARE: Tag = Tag::from_bytes(b"MARE");

    pub const MHDR: Tag = Tag::from_bytes(b"MHDR");
    pub const MCIN: Tag = Tag::from_bytes(b"MCIN");
    pub const MTEX: Tag = Tag::from_bytes(b"MTEX");
    pub const MMDX: Tag = Tag::from_bytes(b"MMDX");
    pub const MMID: Tag = Tag::from_bytes(b"MMID");
    pub const MDDF: Tag = Tag::from_bytes(b"MDDF");
    pub const MCNK: Tag = Tag::from_bytes(b"MCNK");
    pub const MCVT: Tag = Tag::from_bytes(b"MCVT");
    pub const MCNR: Tag = Tag::from_bytes(b"MCNR");
    pub const MCLY: Tag = Tag::from_bytes(b"MCLY");
    pub const MCRF: Tag = Tag::from_bytes(b"MCRF");

    pub const MOHD: Tag = Tag::from_bytes(b"MOHD");
    pub const MOTX: Tag = Tag::from_bytes(b"MOTX");
    pub const MOMT: Tag = Tag::from_bytes(b"MOMT");
    pub const MOGN: Tag = Tag::from_bytes(b"MOGN");
    pub const MOGI: Tag = Tag::from_bytes(b"MOGI");
    pub const MOSB: Tag = Tag::from_bytes(b"MOSB");
    pub const MOPV: Tag = Tag::from_bytes(b"MOPV");
    pub const MOPT: Tag = Tag::from_bytes(b"MOPT");
    pub const MOPR: Tag = Tag::from_bytes(b"MOPR");
    pub const MOVV: Tag = Tag::from_bytes(b"MOVV");
    pub const MOVB: Tag = Tag::from_bytes(b"MOVB");
    pub const MOLT: Tag = Tag::from_bytes(b"MOLT");
    pub const MODS: Tag = Tag::from_bytes(b"MODS");
    pub const MODN: Tag = Tag::from_bytes(b"MODN");
    pub const MODD: Tag = Tag::from_bytes(b"MODD");
    pub const MFOG: Tag = Tag::from_bytes(b"MFOG");

    pub const MOGP: Tag = Tag::from_bytes(b"MOGP");
    pub const MOPY: Tag = Tag::from_bytes(b"MOPY");
    pub const MOVI: Tag = Tag::from_bytes(b"MOVI");
    pub const MOVT: Tag = Tag::from_bytes(b"MOVT");
    pub const MONR: Tag = Tag::from_bytes(b"MONR");
    pub const MOTV: Tag = Tag::from_bytes(b"MOTV");
    pub const MOBA: Tag = Tag::from_bytes(b"MOBA");
    pub const MOCV: Tag = Tag::from_bytes(b"MOCV");
    pub const MOBN: Tag = Tag::from_bytes(b"MOBN");
    pub const MOBR: Tag = Tag::from_bytes(b"MOBR");

    pub const MD21: Tag = Tag::from_bytes(b"MD21");
}
