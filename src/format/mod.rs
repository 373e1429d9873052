//! Low-level binary building blocks shared by every container.
//!
//! - [`chunk`] - Tags, tag byte order and tag-and-length framing
//! - [`deferred`] - Growable buffer with write-ahead u32 slots
//! - [`array`] - `{count, offset}` relocatable arrays
//! - [`strings`] - Append-only NUL-terminated string tables
//! - [`track`] - Per-sequence animation keyframe tracks
//! - [`reader`] - Frame parser for inspection and tests

pub mod chunk;
pub mod deferred;
pub mod array;
pub mod strings;
pub mod track;
pub mod reader;

pub use chunk::{tags, ChunkFramer, Tag, TagOrder, CHUNK_HEADER_SIZE};
pub use deferred::{DeferredBuffer, Placeholder};
pub use array::{ArraySlot, Record, RelocatableArray, ARRAY_HEADER_SIZE, MODEL_DATA_ALIGNMENT};
pub use strings::StringTable;
pub use track::{Interpolation, TrackSequences, TrackSlots, NO_GLOBAL_SEQUENCE};
pub use reader::{find_chunk, read_chunks, read_subchunks, ChunkRef};
#[cfg(feature = "mmap")]
pub use reader::ContainerFile;
