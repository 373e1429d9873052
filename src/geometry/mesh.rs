//! Mesh buffers.
//!
//! Indices are stored as u16 on disk, so a mesh may address at most
//! [`MAX_VERTICES`] vertices.

use serde::{Deserialize, Serialize};

use crate::util::{BBox3f, Bgra, Error, Result, TriangleFace, Vec2, Vec3};

/// Largest vertex count addressable by a u16 index buffer.
pub const MAX_VERTICES: usize = u16::MAX as usize + 1;

/// Render mesh handed over by the upstream loader.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshData {
    /// Vertex positions.
    pub positions: Vec<Vec3>,
    /// Per-vertex normals, empty or one per position.
    pub normals: Vec<Vec3>,
    /// Per-vertex texture coordinates, empty or one per position.
    pub uvs: Vec<Vec2>,
    /// Per-vertex colors, empty or one per position.
    pub colors: Vec<Bgra>,
    /// Triangle faces.
    pub triangles: Vec<TriangleFace>,
    /// Material index of each triangle.
    pub materials: Vec<u16>,
}

impl MeshData {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh from positions and faces, every face using `material`.
    pub fn from_faces(positions: Vec<Vec3>, triangles: Vec<TriangleFace>, material: u16) -> Self {
        let materials = vec![material; triangles.len()];
        Self {
            positions,
            triangles,
            materials,
            ..Self::default()
        }
    }

    /// Get number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Get number of triangles.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Check if the mesh has no triangles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Check if mesh has normals.
    #[inline]
    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    /// Check if mesh has vertex colors.
    #[inline]
    pub fn has_colors(&self) -> bool {
        !self.colors.is_empty()
    }

    /// Normal of vertex `i`, or +Z when the mesh carries none.
    #[inline]
    pub fn normal(&self, i: usize) -> Vec3 {
        self.normals.get(i).copied().unwrap_or(Vec3::Z)
    }

    /// Texture coordinate of vertex `i`, or zero.
    #[inline]
    pub fn uv(&self, i: usize) -> Vec2 {
        self.uvs.get(i).copied().unwrap_or(Vec2::ZERO)
    }

    /// Bounds of every position.
    pub fn bounds(&self) -> BBox3f {
        BBox3f::from_points(&self.positions)
    }

    /// Distinct material indices in ascending order.
    pub fn material_ids(&self) -> Vec<u16> {
        let mut ids = self.materials.clone();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Check the buffer shape invariants.
    pub fn validate(&self) -> Result<()> {
        let n = self.positions.len();
        if n > MAX_VERTICES {
            return Err(Error::mesh(format!("{} vertices exceed the u16 index limit", n)));
        }
        if !self.normals.is_empty() && self.normals.len() != n {
            return Err(Error::mesh(format!("{} normals for {} positions", self.normals.len(), n)));
        }
        if !self.colors.is_empty() && self.colors.len() != n {
            return Err(Error::mesh(format!("{} colors for {} positions", self.colors.len(), n)));
        }
        if !self.uvs.is_empty() && self.uvs.len() != n {
            return Err(Error::mesh(format!("{} uvs for {} positions", self.uvs.len(), n)));
        }
        if self.materials.len() != self.triangles.len() {
            return Err(Error::mesh(format!(
                "{} material indices for {} triangles",
                self.materials.len(),
                self.triangles.len()
            )));
        }
        check_indices(&self.triangles, n)
    }
}

fn check_indices(triangles: &[TriangleFace], vertex_count: usize) -> Result<()> {
    for (i, face) in triangles.iter().enumerate() {
        if face.max_index() as usize >= vertex_count {
            return Err(Error::mesh(format!(
                "triangle {} references vertex {} of {}",
                i,
                face.max_index(),
                vertex_count
            )));
        }
    }
    Ok(())
}

/// Collision geometry. Always an owned copy, never a view of a render mesh.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionMesh {
    pub positions: Vec<Vec3>,
    pub triangles: Vec<TriangleFace>,
}

impl CollisionMesh {
    /// Copy positions and faces of a render mesh.
    pub fn from_render(mesh: &MeshData) -> Self {
        Self {
            positions: mesh.positions.clone(),
            triangles: mesh.triangles.clone(),
        }
    }

    /// Get number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Get number of triangles.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Check if the mesh has no triangles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Bounds of every position.
    pub fn bounds(&self) -> BBox3f {
        BBox3f::from_points(&self.positions)
    }

    /// Unit normal of every face. Degenerate faces get a zero normal.
    pub fn face_normals(&self) -> Vec<Vec3> {
        self.triangles
            .iter()
            .map(|face| {
                let [a, b, c] = face
                    .indices()
                    .map(|i| self.positions.get(i as usize).copied().unwrap_or(Vec3::ZERO));
                (b - a).cross(c - a).normalize_or_zero()
            })
            .collect()
    }

    /// Check that every face addresses a valid vertex.
    pub fn validate(&self) -> Result<()> {
        if self.positions.len() > MAX_VERTICES {
            return Err(Error::mesh(format!(
                "{} collision vertices exceed the u16 index limit",
                self.positions.len()
            )));
        }
        check_indices(&self.triangles, self.positions.len())
    }
}

/// Pick the explicit collision mesh, or copy the render mesh when there is none.
pub fn resolve_collision(explicit: Option<&CollisionMesh>, render: &MeshData) -> CollisionMesh {
    match explicit {
        Some(mesh) => mesh.clone(),
        None => CollisionMesh::from_render(render),
    }
}
