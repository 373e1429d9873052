//! Static object root file (`<name>.wmo`).

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use super::wmo_group::flags_for;
use super::{report, ContainerKind, EncodeOptions, WMO_VERSION};
use crate::assembler::ContainerBuilder;
use crate::format::{tags, StringTable};
use crate::model::{DoodadInstance, Fog, ObjectLight, StaticMaterial, StaticObject};
use crate::registry::ObjectProperties;
use crate::util::{to_u32, write_vec3, Bgra, Diagnostics, Error, Result};

/// Root header flags written for every object.
pub const ROOT_FLAGS: u32 = 0x2 | 0x4 | 0x8;

/// Name of the single doodad set.
pub const DEFAULT_DOODAD_SET: &str = "Set_$DefaultGlobal";

const DOODAD_SET_NAME_SIZE: usize = 20;

/// Fog flag for a fog without a radius limit.
const FOG_INFINITE_RADIUS: u32 = 0x1;

/// Doodad name offsets must fit in the low 24 bits of a MODD record.
const DOODAD_NAME_MASK: u32 = 0x00FF_FFFF;

/// Group names, as offsets into the MOGN blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupNames {
    pub blob: Vec<u8>,
    pub offsets: Vec<u32>,
}

/// Build the MOGN table. Unnamed groups get `<object>_<iii>`.
pub fn group_names(object: &StaticObject) -> Result<GroupNames> {
    let mut table = StringTable::with_prefix(b"\0\0");
    for (i, group) in object.groups.iter().enumerate() {
        if group.name.is_empty() {
            table.insert(&format!("{}_{:03}", object.name, i))?;
        } else {
            table.insert(&group.name)?;
        }
    }
    let offsets = table.offsets().to_vec();
    let mut blob = table.into_bytes();
    pad_to_4(&mut blob);
    Ok(GroupNames { blob, offsets })
}

fn pad_to_4(bytes: &mut Vec<u8>) {
    let rem = bytes.len() % 4;
    if rem != 0 {
        bytes.resize(bytes.len() + 4 - rem, 0);
    }
}

/// Materials padded so every material a face references exists.
fn padded_materials(object: &StaticObject) -> Vec<StaticMaterial> {
    let mut materials = object.materials.clone();
    let needed = object
        .groups
        .iter()
        .flat_map(|g| g.mesh.materials.iter())
        .map(|&m| m as usize + 1)
        .max()
        .unwrap_or(0);
    if materials.len() < needed {
        materials.resize(needed, StaticMaterial::default());
    }
    materials
}

fn write_material(out: &mut Vec<u8>, material: &StaticMaterial, texture_offset: u32) -> Result<()> {
    out.write_u32::<LittleEndian>(material.flags)?;
    out.write_u32::<LittleEndian>(material.shader)?;
    out.write_u32::<LittleEndian>(material.blend_mode)?;
    out.write_u32::<LittleEndian>(texture_offset)?;
    out.write_all(bytemuck::bytes_of(&material.emissive))?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_all(bytemuck::bytes_of(&material.diffuse))?;
    out.write_u32::<LittleEndian>(material.ground_type)?;
    // texture3, color2, flags2, runtime data
    out.resize(out.len() + 4 * 7, 0);
    Ok(())
}

fn write_light(out: &mut Vec<u8>, light: &ObjectLight) -> Result<()> {
    out.write_u8(0)?;
    out.write_u8(1)?;
    out.write_u16::<LittleEndian>(0)?;
    out.write_all(bytemuck::bytes_of(&light.color))?;
    write_vec3(out, light.position)?;
    out.write_f32::<LittleEndian>(light.intensity)?;
    for v in [0.0, 0.0, -1.0, -0.5] {
        out.write_f32::<LittleEndian>(v)?;
    }
    out.write_f32::<LittleEndian>(light.attenuation_start)?;
    out.write_f32::<LittleEndian>(light.attenuation_end)?;
    Ok(())
}

fn write_doodad(out: &mut Vec<u8>, doodad: &DoodadInstance, name_offset: u32) -> Result<()> {
    if name_offset > DOODAD_NAME_MASK {
        return Err(Error::invalid(format!("doodad name offset {} exceeds 24 bits", name_offset)));
    }
    out.write_u32::<LittleEndian>(name_offset | (u32::from(doodad.flags) << 24))?;
    write_vec3(out, doodad.position)?;
    for c in doodad.rotation.to_array() {
        out.write_f32::<LittleEndian>(c)?;
    }
    out.write_f32::<LittleEndian>(doodad.scale)?;
    out.write_all(bytemuck::bytes_of(&doodad.color))?;
    Ok(())
}

fn write_fog(out: &mut Vec<u8>, fog: &Fog) -> Result<()> {
    out.write_u32::<LittleEndian>(if fog.infinite_radius { FOG_INFINITE_RADIUS } else { 0 })?;
    write_vec3(out, fog.position)?;
    out.write_f32::<LittleEndian>(fog.near_radius)?;
    out.write_f32::<LittleEndian>(fog.far_radius)?;
    out.write_f32::<LittleEndian>(fog.end)?;
    out.write_f32::<LittleEndian>(fog.start_scalar)?;
    out.write_all(bytemuck::bytes_of(&fog.color))?;
    out.write_f32::<LittleEndian>(fog.underwater_end)?;
    out.write_f32::<LittleEndian>(fog.underwater_start_scalar)?;
    out.write_all(bytemuck::bytes_of(&fog.underwater_color))?;
    Ok(())
}

/// Encode the root file of `object`.
pub fn encode(
    object: &StaticObject,
    names: &GroupNames,
    props: Option<&ObjectProperties>,
    opts: &EncodeOptions,
    diag: &mut Diagnostics,
) -> Result<Vec<u8>> {
    let mut builder = ContainerBuilder::new(ContainerKind::WmoRoot);
    builder.push_chunk(tags::MVER, WMO_VERSION.to_le_bytes().to_vec())?;

    let mut motx = StringTable::aligned(4);
    for texture in &object.textures {
        motx.insert(&opts.texture_path(texture))?;
    }
    motx.terminate_with(4);
    let texture_offsets = motx.offsets().to_vec();

    let materials = padded_materials(object);
    let modn_entries = object.doodads.len();
    let bounds = object.bounds();
    let ambient = props
        .and_then(|p| p.ambient)
        .or(object.ambient)
        .unwrap_or(Bgra::rgba(0, 0, 0, 255));

    let mut mohd = Vec::with_capacity(64);
    for count in [
        object.textures.len(),
        object.groups.len(),
        0,
        object.lights.len(),
        modn_entries,
        object.doodads.len(),
        1,
    ] {
        mohd.write_u32::<LittleEndian>(to_u32(count)?)?;
    }
    mohd.write_all(bytemuck::bytes_of(&ambient))?;
    mohd.write_u32::<LittleEndian>(props.and_then(|p| p.wmo_id).unwrap_or(0))?;
    bounds.write_high_res(&mut mohd)?;
    mohd.write_u32::<LittleEndian>(ROOT_FLAGS)?;
    builder.push_chunk(tags::MOHD, mohd)?;
    builder.push_chunk(tags::MOTX, motx.into_bytes())?;

    let mut momt = Vec::with_capacity(materials.len() * 64);
    for (i, material) in materials.iter().enumerate() {
        let offset = match material.texture {
            None => 0,
            Some(t) => match texture_offsets.get(t as usize) {
                Some(&offset) => offset,
                None => {
                    report(diag, opts.strict, "MOMT", &format!("material[{}]", i), format!("texture {} does not exist", t))?;
                    0
                }
            },
        };
        write_material(&mut momt, material, offset)?;
    }
    builder.push_chunk(tags::MOMT, momt)?;
    builder.push_chunk(tags::MOGN, names.blob.clone())?;

    let mut mogi = Vec::with_capacity(object.groups.len() * 32);
    for (group, &name_offset) in object.groups.iter().zip(&names.offsets) {
        mogi.write_u32::<LittleEndian>(flags_for(group, props))?;
        let group_bounds = if group.mesh.is_empty() {
            crate::util::BBox3f::ZERO
        } else {
            group.mesh.bounds()
        };
        group_bounds.write_high_res(&mut mogi)?;
        mogi.write_i32::<LittleEndian>(name_offset as i32)?;
    }
    builder.push_chunk(tags::MOGI, mogi)?;

    let skybox = props.and_then(|p| p.skybox.as_deref()).or(object.skybox.as_deref());
    let mut mosb = skybox.map(|s| s.as_bytes().to_vec()).unwrap_or_default();
    mosb.push(0);
    pad_to_4(&mut mosb);
    builder.push_chunk(tags::MOSB, mosb)?;

    for tag in [tags::MOPV, tags::MOPT, tags::MOPR, tags::MOVV, tags::MOVB] {
        builder.push_chunk(tag, Vec::new())?;
    }

    let mut molt = Vec::with_capacity(object.lights.len() * 48);
    for light in &object.lights {
        write_light(&mut molt, light)?;
    }
    builder.push_chunk(tags::MOLT, molt)?;

    let mut mods = Vec::with_capacity(32);
    let mut set_name = [0u8; DOODAD_SET_NAME_SIZE];
    set_name[..DEFAULT_DOODAD_SET.len()].copy_from_slice(DEFAULT_DOODAD_SET.as_bytes());
    mods.write_all(&set_name)?;
    mods.write_u32::<LittleEndian>(0)?;
    mods.write_u32::<LittleEndian>(to_u32(object.doodads.len())?)?;
    mods.write_u32::<LittleEndian>(0)?;
    builder.push_chunk(tags::MODS, mods)?;

    let mut modn = StringTable::new();
    for doodad in &object.doodads {
        modn.insert(&doodad.model)?;
    }
    let name_offsets = modn.offsets().to_vec();
    builder.push_chunk(tags::MODN, modn.into_bytes())?;

    let mut modd = Vec::with_capacity(object.doodads.len() * 40);
    for (doodad, &offset) in object.doodads.iter().zip(&name_offsets) {
        write_doodad(&mut modd, doodad, offset)?;
    }
    builder.push_chunk(tags::MODD, modd)?;

    let mut mfog = Vec::with_capacity(48);
    if object.fogs.is_empty() {
        write_fog(&mut mfog, &Fog::default())?;
    }
    for fog in &object.fogs {
        write_fog(&mut mfog, fog)?;
    }
    builder.push_chunk(tags::MFOG, mfog)?;

    builder.assemble()?;
    debug!(object = %object.name, groups = object.groups.len(), textures = object.textures.len(), "encoded wmo root");
    builder.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::reader::{read_chunks, read_u32_at};
    use crate::format::{Tag, TagOrder};
    use crate::geometry::MeshData;
    use crate::model::ObjectGroup;
    use crate::util::{Quat, TriangleFace, Vec3};

    fn hut() -> StaticObject {
        let mut object = StaticObject::new("hut");
        object.textures = vec!["wall01".into(), "roof".into()];
        object.materials = vec![StaticMaterial::textured(0), StaticMaterial::textured(1)];
        object.groups.push(ObjectGroup {
            name: String::new(),
            mesh: MeshData::from_faces(
                vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                vec![TriangleFace::new(0, 1, 2)],
                1,
            ),
            collision: None,
            indoor: false,
        });
        object.doodads.push(DoodadInstance {
            model: "barrel.m2".into(),
            rotation: Quat::from_xyzw(0.0, 0.0, 1.0, 0.0),
            ..Default::default()
        });
        object
    }

    fn encode_hut(object: &StaticObject) -> Vec<u8> {
        let names = group_names(object).unwrap();
        encode(object, &names, None, &EncodeOptions::default(), &mut Diagnostics::new("hut")).unwrap()
    }

    #[test]
    fn test_chunk_order() {
        let bytes = encode_hut(&hut());
        let chunks = read_chunks(&bytes, TagOrder::Reversed).unwrap();
        let found: Vec<Tag> = chunks.iter().map(|c| c.tag).collect();
        let expected: Vec<Tag> = ContainerKind::WmoRoot.layout().tags().collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_textures_and_materials() {
        let bytes = encode_hut(&hut());
        let chunks = read_chunks(&bytes, TagOrder::Reversed).unwrap();
        let motx = chunks[2].payload;
        assert_eq!(motx, b"wall01\0\0roof\0\0\0\0\0\0\0\0");
        let momt = chunks[3].payload;
        assert_eq!(momt.len(), 128);
        assert_eq!(read_u32_at(momt, 12).unwrap(), 0);
        assert_eq!(read_u32_at(momt, 64 + 12).unwrap(), 8);
        assert_eq!(read_u32_at(momt, 32).unwrap(), 6);
    }

    #[test]
    fn test_header_counts() {
        let bytes = encode_hut(&hut());
        let chunks = read_chunks(&bytes, TagOrder::Reversed).unwrap();
        let mohd = chunks[1].payload;
        assert_eq!(mohd.len(), 64);
        let counts: Vec<u32> = (0..7).map(|i| read_u32_at(mohd, i * 4).unwrap()).collect();
        assert_eq!(counts, vec![2, 1, 0, 0, 1, 1, 1]);
        assert_eq!(read_u32_at(mohd, 60).unwrap(), ROOT_FLAGS);
    }

    #[test]
    fn test_group_names() {
        let mut object = hut();
        object.groups.push(ObjectGroup {
            name: "cellar".into(),
            ..Default::default()
        });
        let names = group_names(&object).unwrap();
        assert_eq!(names.offsets, vec![2, 10]);
        assert_eq!(&names.blob[..17], b"\0\0hut_000\0cellar\0");
        assert_eq!(names.blob.len() % 4, 0);
    }

    #[test]
    fn test_doodads_and_defaults() {
        let bytes = encode_hut(&hut());
        let chunks = read_chunks(&bytes, TagOrder::Reversed).unwrap();
        let by_tag = |t: Tag| chunks.iter().find(|c| c.tag == t).unwrap().payload;
        assert_eq!(by_tag(tags::MOSB), &[0, 0, 0, 0]);
        let mods = by_tag(tags::MODS);
        assert_eq!(&mods[..18], DEFAULT_DOODAD_SET.as_bytes());
        assert_eq!(read_u32_at(mods, 24).unwrap(), 1);
        assert_eq!(by_tag(tags::MODN), b"barrel.m2\0");
        let modd = by_tag(tags::MODD);
        assert_eq!(modd.len(), 40);
        assert_eq!(read_u32_at(modd, 0).unwrap(), 0x0100_0000);
        assert_eq!(&modd[32..36], &1.0f32.to_le_bytes());
        assert_eq!(&modd[36..40], &[255, 255, 255, 255]);
        assert_eq!(by_tag(tags::MFOG).len(), 48);
        assert!(by_tag(tags::MOPV).is_empty());
    }

    #[test]
    fn test_missing_texture_reported() {
        let mut object = hut();
        object.materials[1].texture = Some(9);
        let names = group_names(&object).unwrap();
        let mut diag = Diagnostics::new("hut");
        encode(&object, &names, None, &EncodeOptions::default(), &mut diag).unwrap();
        assert_eq!(diag.len(), 1);
        assert_eq!(diag.entries()[0].chunk.as_deref(), Some("MOMT"));

        let strict = EncodeOptions {
            strict: true,
            ..Default::default()
        };
        assert!(encode(&object, &names, None, &strict, &mut Diagnostics::new("hut")).is_err());
    }

    #[test]
    fn test_registry_overrides() {
        let props = ObjectProperties {
            wmo_id: Some(77),
            skybox: Some("sky.m2".into()),
            ..Default::default()
        };
        let object = hut();
        let names = group_names(&object).unwrap();
        let bytes = encode(&object, &names, Some(&props), &EncodeOptions::default(), &mut Diagnostics::new("hut")).unwrap();
        let chunks = read_chunks(&bytes, TagOrder::Reversed).unwrap();
        assert_eq!(read_u32_at(chunks[1].payload, 32).unwrap(), 77);
        assert_eq!(chunks[6].payload, b"sky.m2\0\0");
    }
}
