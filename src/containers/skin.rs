//! Skin profile (`<name>00.skin`) encoder and texture units.
//!
//! A skin profile holds the draw data of a model: a vertex lookup, the
//! triangle index buffer grouped by material, one submesh per material
//! range and one texture unit per submesh. Offsets are relative to the
//! start of the file.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use super::m2::ModelTables;
use crate::format::{ArraySlot, DeferredBuffer, MODEL_DATA_ALIGNMENT};
use crate::geometry::{MaterialRange, MeshData, SubmeshLayout};
use crate::model::AnimatedModel;
use crate::util::{Encodable, Error, Result, Vec3};

/// Skin magic, stored literally.
pub const SKIN_MAGIC: &[u8; 4] = b"SKIN";

/// Size of the skin header.
pub const SKIN_HEADER_SIZE: usize = 48;

/// Largest number of bones one draw call may reference.
pub const BONE_COUNT_MAX: u32 = 21;

/// Highest material layer a texture unit can carry.
pub const MAX_MATERIAL_LAYER: u16 = 7;

/// Texture unit flags.
pub mod unit_flags {
    /// Texture unit is not animated.
    pub const STATIC: u8 = 0x10;
}

/// One draw call: a skin section bound to a material and its lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureUnit {
    pub flags: u8,
    pub priority: i8,
    pub shader_id: u16,
    pub skin_section_index: u16,
    pub geoset_index: u16,
    /// Color index, or -1 for none.
    pub color_index: i16,
    pub material_index: u16,
    pub material_layer: u16,
    pub texture_count: u16,
    pub texture_lookup: u16,
    pub texture_mapping_lookup: u16,
    pub transparency_lookup: u16,
    pub texture_transform_lookup: u16,
}

/// Texture unit for submesh `submesh_index` drawn with one texture.
///
/// The skin section index and the geoset index are always equal.
pub fn build_skin_section(submesh_index: u16, material_index: u16, texture_lookup_index: u16) -> TextureUnit {
    TextureUnit {
        flags: unit_flags::STATIC,
        priority: 0,
        shader_id: 0,
        skin_section_index: submesh_index,
        geoset_index: submesh_index,
        color_index: -1,
        material_index,
        material_layer: 0,
        texture_count: 1,
        texture_lookup: texture_lookup_index,
        texture_mapping_lookup: 0,
        transparency_lookup: 0,
        texture_transform_lookup: 0,
    }
}

impl TextureUnit {
    /// Set the material layer, capped at [`MAX_MATERIAL_LAYER`].
    pub fn with_layer(mut self, layer: u16) -> Self {
        self.material_layer = layer.min(MAX_MATERIAL_LAYER);
        self
    }

    pub fn with_color(mut self, color_index: i16) -> Self {
        self.color_index = color_index;
        self
    }

    pub fn with_transparency_lookup(mut self, index: u16) -> Self {
        self.transparency_lookup = index;
        self
    }

    pub fn with_texture_transform_lookup(mut self, index: u16) -> Self {
        self.texture_transform_lookup = index;
        self
    }
}

impl Encodable for TextureUnit {
    const BYTE_WIDTH: usize = 24;

    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(self.flags)?;
        w.write_i8(self.priority)?;
        w.write_u16::<LittleEndian>(self.shader_id)?;
        w.write_u16::<LittleEndian>(self.skin_section_index)?;
        w.write_u16::<LittleEndian>(self.geoset_index)?;
        w.write_i16::<LittleEndian>(self.color_index)?;
        w.write_u16::<LittleEndian>(self.material_index)?;
        w.write_u16::<LittleEndian>(self.material_layer)?;
        w.write_u16::<LittleEndian>(self.texture_count)?;
        w.write_u16::<LittleEndian>(self.texture_lookup)?;
        w.write_u16::<LittleEndian>(self.texture_mapping_lookup)?;
        w.write_u16::<LittleEndian>(self.transparency_lookup)?;
        w.write_u16::<LittleEndian>(self.texture_transform_lookup)
    }
}

/// Submesh record of a skin profile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkinSubmesh {
    pub id: u16,
    /// High 16 bits of the index start.
    pub level: u16,
    pub vertex_start: u16,
    pub vertex_count: u16,
    pub index_start: u16,
    pub index_count: u16,
    pub bone_count: u16,
    pub bone_combo_index: u16,
    pub bone_influences: u16,
    pub center_bone: u16,
    pub center: Vec3,
    pub sort_center: Vec3,
    pub sort_radius: f32,
}

impl SkinSubmesh {
    /// Describe one material range of `mesh`.
    pub fn from_range(range: &MaterialRange, layout: &SubmeshLayout, mesh: &MeshData) -> Result<Self> {
        let narrow = |value: u32, what: &str| {
            u16::try_from(value).map_err(|_| Error::mesh(format!("submesh {} {} exceeds 16 bits", what, value)))
        };
        let index_start = range.index_start();

        let mut referenced = vec![false; mesh.vertex_count()];
        let first = range.first_face as usize;
        for &face in layout.order.iter().skip(first).take(range.face_count as usize) {
            if let Some(tri) = mesh.triangles.get(face as usize) {
                for i in tri.indices() {
                    if let Some(slot) = referenced.get_mut(i as usize) {
                        *slot = true;
                    }
                }
            }
        }
        let (sum, count) = referenced
            .iter()
            .zip(&mesh.positions)
            .filter(|(used, _)| **used)
            .fold((Vec3::ZERO, 0u32), |(sum, n), (_, p)| (sum + *p, n + 1));
        let center = if count > 0 { sum / count as f32 } else { Vec3::ZERO };

        Ok(Self {
            id: 0,
            level: (index_start >> 16) as u16,
            vertex_start: narrow(range.vertex_start, "vertex start")?,
            vertex_count: narrow(range.vertex_count(), "vertex count")?,
            index_start: (index_start & 0xFFFF) as u16,
            index_count: narrow(range.index_count(), "index count")?,
            bone_count: 1,
            bone_combo_index: 0,
            bone_influences: 1,
            center_bone: 0,
            center,
            sort_center: range.bounds.center(),
            sort_radius: range.bounds.radius(),
        })
    }
}

impl Encodable for SkinSubmesh {
    const BYTE_WIDTH: usize = 48;

    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for v in [
            self.id,
            self.level,
            self.vertex_start,
            self.vertex_count,
            self.index_start,
            self.index_count,
            self.bone_count,
            self.bone_combo_index,
            self.bone_influences,
            self.center_bone,
        ] {
            w.write_u16::<LittleEndian>(v)?;
        }
        self.center.encode(w)?;
        self.sort_center.encode(w)?;
        w.write_f32::<LittleEndian>(self.sort_radius)
    }
}

/// Draw data of a model, ready to encode.
#[derive(Clone, Debug, PartialEq)]
pub struct SkinProfile {
    pub vertex_lookup: Vec<u16>,
    pub indices: Vec<u16>,
    pub bone_indices: Vec<[u8; 4]>,
    pub submeshes: Vec<SkinSubmesh>,
    pub units: Vec<TextureUnit>,
}

impl SkinProfile {
    /// Build the profile of a validated model.
    pub fn build(model: &AnimatedModel, layout: &SubmeshLayout, tables: &ModelTables) -> Result<Self> {
        let mesh = &model.mesh;
        let n = mesh.vertex_count();
        let mut submeshes = Vec::with_capacity(layout.ranges.len());
        let mut units = Vec::with_capacity(layout.ranges.len());
        for (i, range) in layout.ranges.iter().enumerate() {
            let index = u16::try_from(i).map_err(|_| Error::mesh("too many submeshes"))?;
            submeshes.push(SkinSubmesh::from_range(range, layout, mesh)?);
            units.push(tables.texture_unit(index, range));
        }
        Ok(Self {
            vertex_lookup: (0..n).map(|i| i as u16).collect(),
            indices: layout.index_buffer(mesh),
            bone_indices: (0..n).map(|i| model.indices(i)).collect(),
            submeshes,
            units,
        })
    }

    /// Encode the skin file.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let align = MODEL_DATA_ALIGNMENT;
        let mut buf = DeferredBuffer::new();
        buf.put_bytes(SKIN_MAGIC);
        let vertices = ArraySlot::reserve(&mut buf);
        let indices = ArraySlot::reserve(&mut buf);
        let bones = ArraySlot::reserve(&mut buf);
        let submeshes = ArraySlot::reserve(&mut buf);
        let units = ArraySlot::reserve(&mut buf);
        buf.put_u32(BONE_COUNT_MAX)?;

        vertices.write_elements(&mut buf, &self.vertex_lookup, align)?;
        indices.write_elements(&mut buf, &self.indices, align)?;
        bones.write_elements(&mut buf, &self.bone_indices, align)?;
        submeshes.write_elements(&mut buf, &self.submeshes, align)?;
        units.write_elements(&mut buf, &self.units, align)?;

        debug!(submeshes = self.submeshes.len(), indices = self.indices.len(), "encoded skin profile");
        buf.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::EncodeOptions;
    use crate::format::reader::{read_array_header, read_i16_at, read_u16_at, read_u32_at};
    use crate::geometry::submeshes_by_material;
    use crate::model::ModelMaterial;
    use crate::util::TriangleFace;

    fn two_material_model() -> AnimatedModel {
        let mut model = AnimatedModel::new("crate");
        model.mesh = MeshData::from_faces(
            (0..6).map(|i| Vec3::new(i as f32, (i % 2) as f32, 0.0)).collect(),
            vec![
                TriangleFace::new(3, 4, 5),
                TriangleFace::new(0, 1, 2),
                TriangleFace::new(2, 3, 4),
            ],
            0,
        );
        model.mesh.materials = vec![1, 0, 1];
        model.materials = vec![
            ModelMaterial::default(),
            ModelMaterial {
                texture: 0,
                layer: 12,
                ..Default::default()
            },
        ];
        model
    }

    fn profile(model: &AnimatedModel) -> SkinProfile {
        let tables = ModelTables::build(model, &EncodeOptions::default()).unwrap();
        SkinProfile::build(model, &submeshes_by_material(&model.mesh), &tables).unwrap()
    }

    #[test]
    fn test_build_skin_section() {
        let unit = build_skin_section(3, 2, 5);
        assert_eq!(unit.skin_section_index, 3);
        assert_eq!(unit.geoset_index, 3);
        assert_eq!(unit.color_index, -1);
        assert_eq!(unit.flags, unit_flags::STATIC);
        assert_eq!(unit.texture_count, 1);
        assert_eq!(unit.texture_lookup, 5);
        assert_eq!(unit.with_layer(40).material_layer, MAX_MATERIAL_LAYER);

        let mut bytes = Vec::new();
        unit.encode(&mut bytes).unwrap();
        assert_eq!(bytes.len(), TextureUnit::BYTE_WIDTH);
        assert_eq!(&bytes[4..8], &[3, 0, 3, 0]);
    }

    #[test]
    fn test_profile_groups_by_material() {
        let model = two_material_model();
        let p = profile(&model);
        assert_eq!(p.indices, vec![0, 1, 2, 3, 4, 5, 2, 3, 4]);
        assert_eq!(p.submeshes.len(), 2);
        assert_eq!(p.submeshes[1].index_start, 3);
        assert_eq!(p.submeshes[1].index_count, 6);
        assert_eq!(p.submeshes[1].vertex_start, 2);
        assert_eq!(p.submeshes[1].vertex_count, 4);
        assert_eq!(p.units[1].material_index, 1);
        assert_eq!(p.units[1].material_layer, MAX_MATERIAL_LAYER);
        assert_eq!(p.units[1].skin_section_index, p.units[1].geoset_index);
    }

    #[test]
    fn test_submesh_center() {
        let p = profile(&two_material_model());
        // vertices 0, 1, 2
        assert!((p.submeshes[0].center - Vec3::new(1.0, 1.0 / 3.0, 0.0)).length() < 1e-6);
        assert_eq!(p.submeshes[0].sort_center, Vec3::new(1.0, 0.5, 0.0));
    }

    #[test]
    fn test_encode_header() {
        let model = two_material_model();
        let bytes = profile(&model).encode().unwrap();
        assert_eq!(&bytes[0..4], b"SKIN");
        assert_eq!(read_u32_at(&bytes, 44).unwrap(), BONE_COUNT_MAX);
        let counts: Vec<u32> = (0..5).map(|i| read_array_header(&bytes, 4 + i * 8).unwrap().0).collect();
        assert_eq!(counts, vec![6, 9, 6, 2, 2]);
        let (_, units) = read_array_header(&bytes, 36).unwrap();
        let unit1 = units as usize + 24;
        assert_eq!(read_u16_at(&bytes, unit1 + 4).unwrap(), 1);
        assert_eq!(read_i16_at(&bytes, unit1 + 8).unwrap(), -1);
    }
}
