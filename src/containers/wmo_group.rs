//! Static object group file (`<name>_<iii>.wmo`).
//!
//! The file holds MVER and one MOGP chunk. MOGP is a 68-byte header
//! followed by the group's geometry subchunks.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use super::{ContainerKind, WMO_VERSION};
use crate::assembler::ContainerBuilder;
use crate::format::{tags, ChunkFramer, Tag};
use crate::geometry::{submeshes_by_material, MAX_VERTICES};
use crate::model::ObjectGroup;
use crate::registry::ObjectProperties;
use crate::util::{to_u32, write_vec3, BBox3f, Bgra, Encodable, Error, Result, TriangleFace, Vec2, Vec3};

/// Size of the MOGP header before its subchunks.
pub const MOGP_HEADER_SIZE: usize = 68;

/// Size of one render batch record.
pub const MOBA_ENTRY_SIZE: usize = 24;

/// Size of one BSP node record.
pub const MOBN_ENTRY_SIZE: usize = 16;

/// Liquid type written when the group has no liquid.
const LIQUID_NONE: u32 = 15;

/// MOGP group flags.
pub mod group_flags {
    pub const HAS_BSP_TREE: u32 = 0x1;
    pub const HAS_VERTEX_COLORS: u32 = 0x4;
    pub const IS_OUTDOORS: u32 = 0x8;
    pub const IS_INDOORS: u32 = 0x2000;
}

/// MOPY face flags.
pub mod face_flags {
    /// Face only takes part in collision.
    pub const F_COLLISION: u8 = 0x08;
}

/// Material id of collision-only faces.
pub const COLLISION_MATERIAL: u8 = 0xFF;

/// BSP node flag marking a leaf.
const BSP_LEAF: u16 = 0x4;

/// Flags shared by MOGI and the MOGP header.
pub fn flags_for(group: &ObjectGroup, props: Option<&ObjectProperties>) -> u32 {
    let indoor = props.and_then(|p| p.indoor).unwrap_or(group.indoor);
    let mut flags = group_flags::HAS_BSP_TREE;
    flags |= if indoor {
        group_flags::IS_INDOORS
    } else {
        group_flags::IS_OUTDOORS
    };
    if group.mesh.has_colors() {
        flags |= group_flags::HAS_VERTEX_COLORS;
    }
    flags
}

fn narrow_u16(value: u32, what: &str) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::mesh(format!("{} {} exceeds 16 bits", what, value)))
}

fn put_elements<T: Encodable>(out: &mut Vec<u8>, items: &[T]) -> Result<()> {
    for item in items {
        item.encode(out)?;
    }
    Ok(())
}

/// Vertex and face buffers of a group, render faces first.
struct GroupBuffers {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    colors: Vec<Bgra>,
    faces: Vec<TriangleFace>,
    face_info: Vec<[u8; 2]>,
    collision_faces: Vec<u16>,
}

impl GroupBuffers {
    fn build(group: &ObjectGroup, layout_faces: impl Iterator<Item = TriangleFace>, materials: &[u16]) -> Result<Self> {
        let mesh = &group.mesh;
        let n = mesh.vertex_count();
        let mut buffers = Self {
            positions: mesh.positions.clone(),
            normals: (0..n).map(|i| mesh.normal(i)).collect(),
            uvs: (0..n).map(|i| mesh.uv(i)).collect(),
            colors: mesh.colors.clone(),
            faces: layout_faces.collect(),
            face_info: Vec::with_capacity(mesh.triangle_count()),
            collision_faces: Vec::new(),
        };
        for &m in materials {
            let material = u8::try_from(m)
                .ok()
                .filter(|&m| m != COLLISION_MATERIAL)
                .ok_or_else(|| Error::mesh(format!("material {} does not fit a group face", m)))?;
            buffers.face_info.push([0, material]);
        }

        match &group.collision {
            None => {
                let count = narrow_u16(to_u32(buffers.faces.len())?, "collision face count")?;
                buffers.collision_faces = (0..count).collect();
            }
            Some(collision) => {
                let base = to_u32(buffers.positions.len())?;
                let first = buffers.faces.len();
                buffers.positions.extend_from_slice(&collision.positions);
                let extra = collision.vertex_count();
                buffers.normals.extend(std::iter::repeat(Vec3::Z).take(extra));
                buffers.uvs.extend(std::iter::repeat(Vec2::ZERO).take(extra));
                if !buffers.colors.is_empty() {
                    buffers.colors.extend(std::iter::repeat(Bgra::WHITE).take(extra));
                }
                for face in &collision.triangles {
                    buffers.faces.push(face.offset(base));
                    buffers.face_info.push([face_flags::F_COLLISION, COLLISION_MATERIAL]);
                }
                for i in first..buffers.faces.len() {
                    buffers.collision_faces.push(narrow_u16(to_u32(i)?, "collision face index")?);
                }
            }
        }
        if buffers.positions.len() > MAX_VERTICES {
            return Err(Error::mesh(format!(
                "group has {} vertices with collision, limit is {}",
                buffers.positions.len(),
                MAX_VERTICES
            )));
        }
        Ok(buffers)
    }
}

fn subchunk(framer: &ChunkFramer, out: &mut Vec<u8>, tag: Tag, payload: &[u8]) -> Result<()> {
    framer.write_header(out, tag, payload.len())?;
    out.extend_from_slice(payload);
    Ok(())
}

/// Encode one group file.
///
/// `name_offset` is the group's entry in the root's MOGN table. The mesh
/// must already be validated.
pub fn encode(group: &ObjectGroup, name_offset: u32, props: Option<&ObjectProperties>) -> Result<Vec<u8>> {
    let framer = ChunkFramer::new(ContainerKind::WmoGroup.tag_order());
    let mesh = &group.mesh;
    let layout = submeshes_by_material(mesh);
    let buffers = GroupBuffers::build(group, layout.faces(mesh), &layout.face_materials())?;
    let flags = flags_for(group, props);
    let bounds = if buffers.positions.is_empty() {
        BBox3f::ZERO
    } else {
        BBox3f::from_points(&buffers.positions)
    };
    let batches = &layout.ranges;

    let mut mogp = Vec::new();
    mogp.write_u32::<LittleEndian>(name_offset)?; // group name, MOGN offset
    mogp.write_u32::<LittleEndian>(0)?; // descriptive name
    mogp.write_u32::<LittleEndian>(flags)?;
    bounds.write_high_res(&mut mogp)?; // min, max
    mogp.write_u16::<LittleEndian>(0)?; // portal start
    mogp.write_u16::<LittleEndian>(0)?; // portal count
    mogp.write_u16::<LittleEndian>(0)?; // transparent batches
    mogp.write_u16::<LittleEndian>(0)?; // interior batches
    mogp.write_u16::<LittleEndian>(narrow_u16(to_u32(batches.len())?, "batch count")?)?; // exterior batches
    mogp.write_u16::<LittleEndian>(0)?; // padding
    mogp.write_all(&[0; 4])?; // fog ids
    mogp.write_u32::<LittleEndian>(LIQUID_NONE)?; // liquid type
    mogp.write_u32::<LittleEndian>(0)?; // group id
    mogp.write_u32::<LittleEndian>(0)?; // flags2
    mogp.write_u32::<LittleEndian>(0)?; // unused
    debug_assert_eq!(mogp.len(), MOGP_HEADER_SIZE);

    let mopy: Vec<u8> = buffers.face_info.iter().flatten().copied().collect();
    subchunk(&framer, &mut mogp, tags::MOPY, &mopy)?;

    let mut movi = Vec::with_capacity(buffers.faces.len() * 6);
    put_elements(&mut movi, &buffers.faces)?;
    subchunk(&framer, &mut mogp, tags::MOVI, &movi)?;

    let mut movt = Vec::with_capacity(buffers.positions.len() * 12);
    for p in &buffers.positions {
        write_vec3(&mut movt, *p)?;
    }
    subchunk(&framer, &mut mogp, tags::MOVT, &movt)?;

    let mut monr = Vec::with_capacity(buffers.normals.len() * 12);
    put_elements(&mut monr, &buffers.normals)?;
    subchunk(&framer, &mut mogp, tags::MONR, &monr)?;

    let mut motv = Vec::with_capacity(buffers.uvs.len() * 8);
    put_elements(&mut motv, &buffers.uvs)?;
    subchunk(&framer, &mut mogp, tags::MOTV, &motv)?;

    let mut moba = Vec::with_capacity(batches.len() * MOBA_ENTRY_SIZE);
    for range in batches.iter() {
        range.bounds.write_low_res(&mut moba)?;
        moba.write_u32::<LittleEndian>(range.index_start())?;
        moba.write_u16::<LittleEndian>(narrow_u16(range.index_count(), "batch index count")?)?;
        moba.write_u16::<LittleEndian>(narrow_u16(range.vertex_start, "batch first vertex")?)?;
        moba.write_u16::<LittleEndian>(narrow_u16(range.vertex_end, "batch last vertex")?)?;
        moba.write_u8(0)?;
        moba.write_u8(range.material as u8)?;
    }
    subchunk(&framer, &mut mogp, tags::MOBA, &moba)?;

    if !buffers.colors.is_empty() {
        let mut mocv = Vec::with_capacity(buffers.colors.len() * 4);
        put_elements(&mut mocv, &buffers.colors)?;
        subchunk(&framer, &mut mogp, tags::MOCV, &mocv)?;
    }

    let mut mobn = Vec::with_capacity(MOBN_ENTRY_SIZE);
    mobn.write_u16::<LittleEndian>(BSP_LEAF)?;
    mobn.write_i16::<LittleEndian>(-1)?;
    mobn.write_i16::<LittleEndian>(-1)?;
    mobn.write_u16::<LittleEndian>(narrow_u16(to_u32(buffers.collision_faces.len())?, "collision face count")?)?;
    mobn.write_u32::<LittleEndian>(0)?;
    mobn.write_f32::<LittleEndian>(0.0)?;
    subchunk(&framer, &mut mogp, tags::MOBN, &mobn)?;

    let mut mobr = Vec::with_capacity(buffers.collision_faces.len() * 2);
    put_elements(&mut mobr, &buffers.collision_faces)?;
    subchunk(&framer, &mut mogp, tags::MOBR, &mobr)?;

    let mut builder = ContainerBuilder::new(ContainerKind::WmoGroup);
    builder.push_chunk(tags::MVER, WMO_VERSION.to_le_bytes().to_vec())?;
    builder.push_chunk(tags::MOGP, mogp)?;
    builder.assemble()?;
    debug!(group = %group.name, faces = buffers.faces.len(), batches = batches.len(), "encoded wmo group");
    builder.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::reader::{read_chunks, read_f32_at, read_subchunks, read_u16_at, read_u32_at, ChunkRef};
    use crate::format::TagOrder;
    use crate::geometry::{CollisionMesh, MeshData};

    fn quad_group() -> ObjectGroup {
        ObjectGroup {
            name: "main".into(),
            mesh: MeshData::from_faces(
                vec![
                    Vec3::new(0.0, 0.0, 0.0),
                    Vec3::new(1.0, 0.0, 0.0),
                    Vec3::new(1.0, 1.0, 0.0),
                    Vec3::new(0.0, 1.0, 0.0),
                ],
                vec![TriangleFace::new(0, 1, 2), TriangleFace::new(0, 2, 3)],
                0,
            ),
            collision: None,
            indoor: false,
        }
    }

    fn subchunks(bytes: &[u8]) -> (Vec<u8>, usize) {
        let chunks = read_chunks(bytes, TagOrder::Reversed).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].tag, tags::MOGP);
        (chunks[1].payload.to_vec(), chunks[1].payload_offset())
    }

    fn find<'a>(subs: &'a [ChunkRef<'a>], tag: Tag) -> &'a ChunkRef<'a> {
        subs.iter().find(|c| c.tag == tag).unwrap()
    }

    #[test]
    fn test_quad_group() {
        let bytes = encode(&quad_group(), 2, None).unwrap();
        let (mogp, base) = subchunks(&bytes);
        assert_eq!(read_u32_at(&mogp, 0).unwrap(), 2);
        let flags = read_u32_at(&mogp, 8).unwrap();
        assert_eq!(flags, group_flags::HAS_BSP_TREE | group_flags::IS_OUTDOORS);
        assert_eq!(read_u16_at(&mogp, 0x2C).unwrap(), 1);
        assert_eq!(read_u32_at(&mogp, 0x34).unwrap(), LIQUID_NONE);

        let subs = read_subchunks(&mogp[MOGP_HEADER_SIZE..], base + MOGP_HEADER_SIZE, TagOrder::Reversed).unwrap();
        let found: Vec<Tag> = subs.iter().map(|c| c.tag).collect();
        assert_eq!(
            found,
            vec![tags::MOPY, tags::MOVI, tags::MOVT, tags::MONR, tags::MOTV, tags::MOBA, tags::MOBN, tags::MOBR]
        );
        assert_eq!(find(&subs, tags::MOPY).payload, &[0, 0, 0, 0]);
        assert_eq!(find(&subs, tags::MOVI).payload.len(), 12);
        assert_eq!(find(&subs, tags::MOVT).payload.len(), 48);

        let moba = find(&subs, tags::MOBA).payload;
        assert_eq!(moba.len(), MOBA_ENTRY_SIZE);
        assert_eq!(read_u32_at(moba, 12).unwrap(), 0);
        assert_eq!(read_u16_at(moba, 16).unwrap(), 6);
        assert_eq!(read_u16_at(moba, 20).unwrap(), 3);
        assert_eq!(moba[23], 0);

        let mobn = find(&subs, tags::MOBN).payload;
        assert_eq!(read_u16_at(mobn, 0).unwrap(), BSP_LEAF);
        assert_eq!(read_u16_at(mobn, 6).unwrap(), 2);
        assert_eq!(find(&subs, tags::MOBR).payload, &[0, 0, 1, 0]);
    }

    #[test]
    fn test_mogp_header_fields() {
        let bytes = encode(&quad_group(), 2, None).unwrap();
        let (mogp, _) = subchunks(&bytes);
        assert_eq!(read_u32_at(&mogp, 4).unwrap(), 0);
        // bounds: min at 0x0C, max at 0x18
        assert_eq!(read_f32_at(&mogp, 0x0C).unwrap(), 0.0);
        assert_eq!(read_f32_at(&mogp, 0x18).unwrap(), 1.0);
        assert_eq!(read_f32_at(&mogp, 0x1C).unwrap(), 1.0);
        for portal_or_batch in [0x24, 0x26, 0x28, 0x2A, 0x2E] {
            assert_eq!(read_u16_at(&mogp, portal_or_batch).unwrap(), 0);
        }
        assert_eq!(&mogp[0x30..0x34], &[0; 4]);
        for field in [0x38, 0x3C, 0x40] {
            assert_eq!(read_u32_at(&mogp, field).unwrap(), 0);
        }
    }

    #[test]
    fn test_explicit_collision_appended() {
        let mut group = quad_group();
        group.collision = Some(CollisionMesh {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            triangles: vec![TriangleFace::new(0, 1, 2)],
        });
        let bytes = encode(&group, 2, None).unwrap();
        let (mogp, base) = subchunks(&bytes);
        let subs = read_subchunks(&mogp[MOGP_HEADER_SIZE..], base + MOGP_HEADER_SIZE, TagOrder::Reversed).unwrap();
        assert_eq!(
            find(&subs, tags::MOPY).payload,
            &[0, 0, 0, 0, face_flags::F_COLLISION, COLLISION_MATERIAL]
        );
        let movi = find(&subs, tags::MOVI).payload;
        assert_eq!(read_u16_at(movi, 12).unwrap(), 4);
        assert_eq!(find(&subs, tags::MOVT).payload.len(), 7 * 12);
        assert_eq!(find(&subs, tags::MOBR).payload, &[2, 0]);
    }

    #[test]
    fn test_indoor_with_colors() {
        let mut group = quad_group();
        group.indoor = true;
        group.mesh.colors = vec![Bgra::WHITE; 4];
        let bytes = encode(&group, 2, None).unwrap();
        let (mogp, base) = subchunks(&bytes);
        let flags = read_u32_at(&mogp, 8).unwrap();
        assert_eq!(flags & group_flags::IS_INDOORS, group_flags::IS_INDOORS);
        assert_eq!(flags & group_flags::IS_OUTDOORS, 0);
        assert_ne!(flags & group_flags::HAS_VERTEX_COLORS, 0);
        let subs = read_subchunks(&mogp[MOGP_HEADER_SIZE..], base + MOGP_HEADER_SIZE, TagOrder::Reversed).unwrap();
        assert_eq!(find(&subs, tags::MOCV).payload.len(), 16);
    }

    #[test]
    fn test_registry_indoor_override() {
        let props = ObjectProperties {
            indoor: Some(true),
            ..Default::default()
        };
        assert_ne!(flags_for(&quad_group(), Some(&props)) & group_flags::IS_INDOORS, 0);
    }

    #[test]
    fn test_material_out_of_face_range() {
        let mut group = quad_group();
        group.mesh.materials = vec![0, 300];
        assert!(encode(&group, 2, None).is_err());
    }
}
