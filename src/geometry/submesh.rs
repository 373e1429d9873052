//! Grouping of triangles into per-material ranges.
//!
//! Both the skin profile and WMO render batches draw one contiguous index
//! range per material. Faces are ordered by ascending material and keep
//! their original relative order inside a material.

use smallvec::SmallVec;

use super::mesh::MeshData;
use crate::util::{BBox3f, TriangleFace};

/// Contiguous run of faces sharing one material.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialRange {
    /// Material of every face in the range.
    pub material: u16,
    /// First face within the grouped face order.
    pub first_face: u32,
    /// Number of faces.
    pub face_count: u32,
    /// Smallest vertex index referenced.
    pub vertex_start: u32,
    /// Largest vertex index referenced.
    pub vertex_end: u32,
    /// Bounds of the referenced vertices.
    pub bounds: BBox3f,
}

impl MaterialRange {
    /// First entry in the flat index buffer.
    #[inline]
    pub fn index_start(&self) -> u32 {
        self.first_face * 3
    }

    /// Number of entries in the flat index buffer.
    #[inline]
    pub fn index_count(&self) -> u32 {
        self.face_count * 3
    }

    /// Number of vertices spanned by `vertex_start..=vertex_end`.
    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_end - self.vertex_start + 1
    }
}

/// Faces regrouped by material plus the ranges describing each group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubmeshLayout {
    /// Original face indices in grouped order.
    pub order: Vec<u32>,
    /// One range per distinct material, ascending.
    pub ranges: SmallVec<[MaterialRange; 4]>,
}

impl SubmeshLayout {
    /// Faces of `mesh` in grouped order.
    pub fn faces<'a>(&'a self, mesh: &'a MeshData) -> impl Iterator<Item = TriangleFace> + 'a {
        self.order.iter().filter_map(|&i| mesh.triangles.get(i as usize).copied())
    }

    /// Flat u16 index buffer in grouped order.
    pub fn index_buffer(&self, mesh: &MeshData) -> Vec<u16> {
        self.faces(mesh)
            .flat_map(|f| f.indices())
            .map(|i| i as u16)
            .collect()
    }

    /// Material of each face in grouped order.
    pub fn face_materials(&self) -> Vec<u16> {
        self.ranges
            .iter()
            .flat_map(|r| std::iter::repeat(r.material).take(r.face_count as usize))
            .collect()
    }
}

/// Group the faces of a validated mesh by material.
pub fn submeshes_by_material(mesh: &MeshData) -> SubmeshLayout {
    let mut order: Vec<u32> = (0..mesh.triangles.len() as u32).collect();
    // stable: faces keep their relative order inside a material
    order.sort_by_key(|&i| mesh.materials.get(i as usize).copied().unwrap_or(0));

    let mut ranges: SmallVec<[MaterialRange; 4]> = SmallVec::new();
    for (pos, &face_index) in order.iter().enumerate() {
        let material = mesh.materials.get(face_index as usize).copied().unwrap_or(0);
        let Some(face) = mesh.triangles.get(face_index as usize) else {
            continue;
        };
        let starts_new = ranges.last().map_or(true, |r| r.material != material);
        if starts_new {
            ranges.push(MaterialRange {
                material,
                first_face: pos as u32,
                face_count: 0,
                vertex_start: face.min_index(),
                vertex_end: face.max_index(),
                bounds: BBox3f::EMPTY,
            });
        }
        if let Some(range) = ranges.last_mut() {
            range.face_count += 1;
            range.vertex_start = range.vertex_start.min(face.min_index());
            range.vertex_end = range.vertex_end.max(face.max_index());
            for i in face.indices() {
                if let Some(p) = mesh.positions.get(i as usize) {
                    range.bounds.expand_by_point(*p);
                }
            }
        }
    }
    for range in &mut ranges {
        if range.bounds.is_empty() {
            range.bounds = BBox3f::ZERO;
        }
    }
    SubmeshLayout { order, ranges }
}
