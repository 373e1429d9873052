//! Container assembly and on-disk output.
//!
//! - [`builder`] - Chunk ordering, cross-chunk fixups and framing
//! - [`write`] - All-or-nothing file writes and directory preparation
//! - [`paths`] - Deterministic destination paths per container kind

pub mod builder;
pub mod write;
pub mod paths;

pub use builder::{assemble, BuildState, ContainerBuilder, Fixup, FixupValue, OffsetBase};
pub use write::{prepare_directory, write_atomic, DirectoryPolicy};
pub use paths::{validate_name, OutputLayout};
