//! Integration tests for the encoder's end-to-end guarantees.
//!
//! Every test encodes through the public API, writes to a temp directory
//! where the guarantee involves the disk, and re-parses the bytes with
//! `wowasset::format::reader`.

use std::fs;

use wowasset::assembler::OutputLayout;
use wowasset::containers::wmo_group::MOGP_HEADER_SIZE;
use wowasset::containers::{wdl, EncodeOptions};
use wowasset::export::{encode_animated_model, encode_static_object, Exporter};
use wowasset::format::reader::{
    find_chunk, read_array_header, read_chunks, read_subchunks, read_u16_at, read_u32_at,
};
use wowasset::format::strings::read_cstr;
use wowasset::format::{tags, ChunkFramer, DeferredBuffer, RelocatableArray, TagOrder, TrackSequences};
use wowasset::geometry::{resolve_collision, MeshData};
use wowasset::model::{
    AnimatedModel, Asset, HeightmapTile, ModelMaterial, ModelTexture, ObjectGroup, StaticMaterial, StaticObject,
    WorldMap,
};
use wowasset::prelude::*;
use wowasset::util::Vec3;

fn quad() -> MeshData {
    MeshData::from_faces(
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ],
        vec![TriangleFace::new(0, 1, 2), TriangleFace::new(0, 2, 3)],
        0,
    )
}

fn wall() -> StaticObject {
    let mut object = StaticObject::new("wall");
    object.textures.push("wall01".into());
    object.materials.push(StaticMaterial::textured(0));
    object.groups.push(ObjectGroup {
        mesh: quad(),
        ..Default::default()
    });
    object
}

fn wolf() -> AnimatedModel {
    let mut model = AnimatedModel::new("wolf");
    model.mesh = quad();
    model.textures.push(ModelTexture::named("wall01"));
    model.materials.push(ModelMaterial::default());
    model
}

#[test]
fn test_frame_round_trip() {
    let payloads: [&[u8]; 3] = [b"", b"\x01", &[0xAB; 1000]];
    for order in [TagOrder::Reversed, TagOrder::Literal] {
        let framer = ChunkFramer::new(order);
        for (tag, payload) in ["MVER", "MOTX", "MD21"].iter().zip(payloads) {
            let frame = framer.wrap(tag, payload).unwrap();
            assert_eq!(read_u32_at(&frame, 4).unwrap() as usize, payload.len());
            let chunks = read_chunks(&frame, order).unwrap();
            assert_eq!(chunks.len(), 1);
            assert_eq!(chunks[0].tag.as_string(), *tag);
            assert_eq!(chunks[0].payload, payload);
        }
    }
}

#[test]
fn test_offsets_point_at_data() {
    let first: RelocatableArray<u32> = vec![1, 2, 3].into();
    let second: RelocatableArray<u16> = vec![7, 8].into();
    let empty: RelocatableArray<u32> = RelocatableArray::new();

    let mut buf = DeferredBuffer::new();
    buf.put_bytes(b"HEAD");
    let slots = [
        first.write_header(&mut buf),
        second.write_header(&mut buf),
        empty.write_header(&mut buf),
    ];
    let [a, b, c] = slots;
    first.write_data(a, &mut buf, 16).unwrap();
    second.write_data(b, &mut buf, 16).unwrap();
    empty.write_data(c, &mut buf, 16).unwrap();
    let bytes = buf.finish().unwrap();

    let (count, offset) = read_array_header(&bytes, 4).unwrap();
    assert_eq!(count, 3);
    assert_eq!(&bytes[offset as usize..offset as usize + 12], &first.data_bytes().unwrap()[..]);
    let (count, offset) = read_array_header(&bytes, 12).unwrap();
    assert_eq!(count, 2);
    assert_eq!(read_u16_at(&bytes, offset as usize + 2).unwrap(), 8);
    assert_eq!(read_array_header(&bytes, 20).unwrap(), (0, 0));
}

#[test]
fn test_model_offsets_in_bounds() {
    let set = encode_animated_model(&wolf(), &EncodeOptions::default(), &OutputLayout::default(), None).unwrap();
    let m2 = &set.files[0].bytes;
    for &(name, field) in wowasset::containers::m2::HEADER_ARRAYS {
        let (count, offset) = read_array_header(m2, field).unwrap();
        if count > 0 {
            assert!((offset as usize) < m2.len(), "{} points past the end", name);
            assert_eq!(offset % 16, 0, "{} is not aligned", name);
        }
    }
}

#[test]
fn test_track_lengths_stay_paired() {
    let mut track: TrackSequences<u32> = TrackSequences::default();
    assert!(track.add_value_to_last_sequence(0, 1).is_err());
    let s0 = track.add_sequence();
    let s1 = track.add_sequence();
    track.add_value(s0, 0, 10).unwrap();
    track.add_value(s1, 0, 20).unwrap();
    track.add_value_to_last_sequence(50, 21).unwrap();
    assert!(track.add_value(9, 0, 1).is_err());
    track.replicate_first_value_to_end(s0, 100).unwrap();
    assert!(track.replicate_first_value_to_end(7, 100).is_err());

    for i in 0..track.sequence_count() {
        assert_eq!(track.timestamps(i).unwrap().len(), track.values(i).unwrap().len());
    }
    assert_eq!(track.values(s0).unwrap(), &[10, 10]);
}

#[test]
fn test_collision_fallback_is_a_copy() {
    let mut mesh = quad();
    let collision = resolve_collision(None, &mesh);
    assert_eq!(collision.vertex_count(), 4);
    assert_eq!(collision.triangle_count(), 2);

    mesh.positions[0] = Vec3::splat(99.0);
    mesh.triangles.clear();
    assert_eq!(collision.positions[0], Vec3::ZERO);
    assert_eq!(collision.triangle_count(), 2);
}

#[test]
fn test_area_offset_table_size() {
    let mut map = WorldMap::new("azeroth");
    for tiles in [0usize, 1, 3] {
        map.heightmaps = (0..tiles)
            .map(|i| HeightmapTile {
                x: i as u32,
                y: 7,
                heights: vec![0; wdl::MARE_HEIGHTS],
            })
            .collect();
        let bytes = wdl::encode(&map).unwrap();
        let chunks = read_chunks(&bytes, TagOrder::Reversed).unwrap();
        assert_eq!(find_chunk(&chunks, tags::MAOF).unwrap().payload.len(), 64 * 64 * 4);
        assert_eq!(chunks.iter().filter(|c| c.tag == tags::MARE).count(), tiles);
    }
}

#[test]
fn test_wall_texture_lookup_chain() {
    let set = encode_static_object(&wall(), &EncodeOptions::default(), &OutputLayout::default(), None).unwrap();

    let root = read_chunks(&set.files[0].bytes, TagOrder::Reversed).unwrap();
    let order: Vec<_> = root.iter().map(|c| c.tag).collect();
    let expected: Vec<_> = ContainerKind::WmoRoot.layout().tags().collect();
    assert_eq!(order, expected);

    let motx = find_chunk(&root, tags::MOTX).unwrap().payload;
    assert_eq!(&motx[..7], b"wall01\0");

    let group = read_chunks(&set.files[1].bytes, TagOrder::Reversed).unwrap();
    let mogp = find_chunk(&group, tags::MOGP).unwrap();
    let subs = read_subchunks(
        &mogp.payload[MOGP_HEADER_SIZE..],
        mogp.payload_offset() + MOGP_HEADER_SIZE,
        TagOrder::Reversed,
    )
    .unwrap();
    let moba = find_chunk(&subs, tags::MOBA).unwrap().payload;
    let material = moba[23] as usize;

    let momt = find_chunk(&root, tags::MOMT).unwrap().payload;
    let texture_offset = read_u32_at(momt, material * 64 + 12).unwrap();
    assert_eq!(texture_offset, 0);
    assert_eq!(read_cstr(motx, texture_offset as usize), Some("wall01"));
}

#[test]
fn test_model_texture_lookup_chain() {
    let set = encode_animated_model(&wolf(), &EncodeOptions::default(), &OutputLayout::default(), None).unwrap();
    let m2 = &set.files[0].bytes;
    let skin = &set.files[1].bytes;

    let (units, units_at) = read_array_header(skin, 36).unwrap();
    assert_eq!(units, 1);
    let unit = units_at as usize;
    assert_eq!(read_u16_at(skin, unit + 4).unwrap(), read_u16_at(skin, unit + 6).unwrap());
    let lookup_index = read_u16_at(skin, unit + 16).unwrap() as usize;

    let (_, lookup_at) = read_array_header(m2, 0x80).unwrap();
    let texture_index = read_u16_at(m2, lookup_at as usize + lookup_index * 2).unwrap() as usize;
    let (_, textures_at) = read_array_header(m2, 0x50).unwrap();
    let (len, name_at) = read_array_header(m2, textures_at as usize + texture_index * 16 + 8).unwrap();
    assert_eq!(&m2[name_at as usize..(name_at + len) as usize], b"wall01\0");
}

#[test]
fn test_encoding_is_idempotent() {
    let layout = OutputLayout::default();
    let opts = EncodeOptions::default();
    let a = encode_static_object(&wall(), &opts, &layout, None).unwrap();
    let b = encode_static_object(&wall(), &opts, &layout, None).unwrap();
    assert_eq!(a.files, b.files);

    let a = encode_animated_model(&wolf(), &opts, &layout, None).unwrap();
    let b = encode_animated_model(&wolf(), &opts, &layout, None).unwrap();
    assert_eq!(a.files, b.files);
}

#[test]
fn test_exported_files_match_memory() {
    let dir = tempfile::tempdir().unwrap();
    let assets = vec![Asset::StaticObject(wall()), Asset::AnimatedModel(wolf())];
    let first = Exporter::new(ExportConfig::new(dir.path())).export(&assets);
    assert!(first.is_clean());
    assert_eq!(first.written.len(), 4);
    let snapshot: Vec<Vec<u8>> = first.written.iter().map(|p| fs::read(p).unwrap()).collect();

    let second = Exporter::new(ExportConfig::new(dir.path())).export(&assets);
    assert_eq!(first.written, second.written);
    for (path, before) in second.written.iter().zip(&snapshot) {
        assert_eq!(&fs::read(path).unwrap(), before, "{} changed", path.display());
    }

    let set = encode_static_object(&wall(), &EncodeOptions::default(), &OutputLayout::default(), None).unwrap();
    let on_disk = fs::read(dir.path().join("World/wmo/wall/wall.wmo")).unwrap();
    assert_eq!(on_disk, set.files[0].bytes);
}
