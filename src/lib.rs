//! # wowasset
//!
//! Encoder for the chunk-tagged binary containers of the 3.3.5 game client:
//! animated models (`.m2` plus `.skin`), static objects (`.wmo` root and
//! groups), terrain tiles (`.adt`) and map-level files (`.wdt`, `.wdl`).
//!
//! Containers are built fully in memory, their cross-chunk offsets are
//! back-patched, and the result is written to disk atomically.
//!
//! ## Modules
//!
//! - [`util`] - Fixed-width types, errors and diagnostics
//! - [`format`] - Chunk framing, relocatable arrays, string tables, tracks
//! - [`geometry`] - Render and collision meshes, per-material submeshes
//! - [`model`] - In-memory models handed over by the upstream loader
//! - [`containers`] - One encoder per container kind
//! - [`assembler`] - Container build state machine and atomic disk writes
//! - [`registry`] - Per-object property overrides
//! - [`config`] - Export configuration
//! - [`export`] - Per-asset drivers and the parallel batch exporter
//!
//! ## Example
//!
//! ```ignore
//! use wowasset::prelude::*;
//!
//! let config = ExportConfig::new("out").with_strict(true);
//! let assets = wowasset::model::load_assets("hut.json")?;
//! let report = Exporter::from_config(config)?.export(&assets);
//! report.log_summary();
//! ```

pub mod util;
pub mod format;
pub mod geometry;
pub mod model;
pub mod containers;
pub mod assembler;
pub mod registry;
pub mod config;
pub mod export;

// Re-export commonly used types
pub use util::{Diagnostic, Diagnostics, Error, Result};
pub use containers::{ContainerKind, EncodeOptions};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Bgra, Diagnostic, Diagnostics, Error, Result, TriangleFace};
    pub use crate::format::{tags, ChunkFramer, RelocatableArray, StringTable, Tag, TagOrder, TrackSequences};
    pub use crate::geometry::{CollisionMesh, MeshData};
    pub use crate::model::{AnimatedModel, Asset, StaticObject, WorldMap};
    pub use crate::containers::{ContainerKind, EncodeOptions};
    pub use crate::assembler::{assemble, ContainerBuilder, DirectoryPolicy, OutputLayout};
    pub use crate::registry::{ObjectProperties, PropertyRegistry};
    pub use crate::config::ExportConfig;
    pub use crate::export::{ExportReport, Exporter};
}
