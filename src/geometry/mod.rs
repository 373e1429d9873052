//! Render and collision geometry shared by the model and static-object encoders.
//!
//! - [`mesh`] - Vertex/index buffers and the collision fallback
//! - [`submesh`] - Grouping triangles into per-material ranges

pub mod mesh;
pub mod submesh;

pub use mesh::{resolve_collision, CollisionMesh, MeshData, MAX_VERTICES};
pub use submesh::{submeshes_by_material, MaterialRange, SubmeshLayout};

/// Bounding box type written by every container record.
pub type BoundingBox = crate::util::BBox3f;
