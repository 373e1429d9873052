//! Map placement file (`.wdt`).
//!
//! Flags which of the 64x64 tiles exist and, for maps built around a
//! single static object, where that object sits.

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use super::{ContainerKind, MAP_VERSION};
use crate::assembler::ContainerBuilder;
use crate::format::tags;
use crate::model::{ObjectPlacement, WorldMap, MAP_TILES};
use crate::util::{write_vec3, Error, Result};

/// Number of entries in tile tables.
pub const TILE_COUNT: usize = (MAP_TILES * MAP_TILES) as usize;

/// Size of one object placement record.
pub const MODF_ENTRY_SIZE: usize = 64;

/// MPHD header flags.
pub mod mphd_flags {
    /// The map is a single static object with no terrain.
    pub const HAS_GLOBAL_MAP_OBJECT: u32 = 0x1;
}

/// MAIN entry flag of a tile that has terrain.
pub const TILE_HAS_ADT: u32 = 0x1;

/// Position of tile `(x, y)` in a row-major tile table.
pub fn tile_index(x: u32, y: u32) -> Result<usize> {
    if x >= MAP_TILES || y >= MAP_TILES {
        return Err(Error::invalid(format!("tile ({}, {}) outside the {}x{} grid", x, y, MAP_TILES, MAP_TILES)));
    }
    Ok((y * MAP_TILES + x) as usize)
}

/// Append one MODF record.
pub fn write_object_placement(out: &mut Vec<u8>, placement: &ObjectPlacement, name_id: u32) -> Result<()> {
    out.write_u32::<LittleEndian>(name_id)?;
    out.write_i32::<LittleEndian>(placement.unique_id)?;
    write_vec3(out, placement.position)?;
    write_vec3(out, placement.rotation)?;
    placement.bounds.write_placement(out)?;
    out.write_u16::<LittleEndian>(placement.flags)?;
    out.write_u16::<LittleEndian>(placement.doodad_set)?;
    out.write_u16::<LittleEndian>(placement.name_set)?;
    out.write_u16::<LittleEndian>(0)?;
    Ok(())
}

/// Encode the WDT of `map`.
pub fn encode(map: &WorldMap) -> Result<Vec<u8>> {
    let mut builder = ContainerBuilder::new(ContainerKind::Wdt);
    builder.push_chunk(tags::MVER, MAP_VERSION.to_le_bytes().to_vec())?;

    let mut mphd = Vec::with_capacity(32);
    let flags = if map.global_object.is_some() {
        mphd_flags::HAS_GLOBAL_MAP_OBJECT
    } else {
        0
    };
    mphd.write_u32::<LittleEndian>(flags)?;
    mphd.resize(32, 0);
    builder.push_chunk(tags::MPHD, mphd)?;

    let mut main = vec![0u8; TILE_COUNT * 8];
    for tile in &map.tiles {
        let at = tile_index(tile.x, tile.y)? * 8;
        main[at..at + 4].copy_from_slice(&TILE_HAS_ADT.to_le_bytes());
    }
    builder.push_chunk(tags::MAIN, main)?;

    match &map.global_object {
        Some(object) => {
            let mut mwmo = object.path.as_bytes().to_vec();
            mwmo.push(0);
            builder.push_chunk(tags::MWMO, mwmo)?;
            let mut modf = Vec::with_capacity(MODF_ENTRY_SIZE);
            write_object_placement(&mut modf, object, 0)?;
            builder.push_chunk(tags::MODF, modf)?;
        }
        None => {
            builder.push_chunk(tags::MWMO, Vec::new())?;
        }
    }

    builder.assemble()?;
    debug!(map = %map.name, tiles = map.tiles.len(), "encoded wdt");
    builder.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::reader::{read_chunks, read_i32_at, read_u32_at};
    use crate::format::{Tag, TagOrder};
    use crate::model::MapTile;
    use crate::util::{BBox3f, Vec3};

    fn object_map() -> WorldMap {
        let mut map = WorldMap::new("qeynos");
        map.global_object = Some(ObjectPlacement {
            path: "World\\wmo\\qeynos\\qeynos.wmo".into(),
            position: Vec3::new(1.0, 2.0, 3.0),
            bounds: BBox3f::new(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(1.0, 2.0, 3.0)),
            ..ObjectPlacement::default()
        });
        map
    }

    #[test]
    fn test_global_object_layout() {
        let bytes = encode(&object_map()).unwrap();
        assert_eq!(&bytes[0..4], b"REVM");
        let chunks = read_chunks(&bytes, TagOrder::Reversed).unwrap();
        let found: Vec<Tag> = chunks.iter().map(|c| c.tag).collect();
        assert_eq!(found, vec![tags::MVER, tags::MPHD, tags::MAIN, tags::MWMO, tags::MODF]);
        assert_eq!(read_u32_at(chunks[1].payload, 0).unwrap(), mphd_flags::HAS_GLOBAL_MAP_OBJECT);
        assert_eq!(chunks[1].payload.len(), 32);
        assert_eq!(chunks[2].payload.len(), 32768);
        assert_eq!(chunks[3].payload, b"World\\wmo\\qeynos\\qeynos.wmo\0");

        let modf = chunks[4].payload;
        assert_eq!(modf.len(), MODF_ENTRY_SIZE);
        assert_eq!(read_i32_at(modf, 4).unwrap(), -1);
        // bounds min in Y, Z, X order
        assert_eq!(&modf[32..36], &(-2.0f32).to_le_bytes());
        assert_eq!(&modf[40..44], &(-1.0f32).to_le_bytes());
    }

    #[test]
    fn test_terrain_map() {
        let mut map = WorldMap::new("plains");
        map.tiles.push(MapTile { x: 31, y: 30, ..Default::default() });
        let bytes = encode(&map).unwrap();
        let chunks = read_chunks(&bytes, TagOrder::Reversed).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(read_u32_at(chunks[1].payload, 0).unwrap(), 0);
        let main = chunks[2].payload;
        assert_eq!(read_u32_at(main, (30 * 64 + 31) * 8).unwrap(), TILE_HAS_ADT);
        assert_eq!(main.iter().filter(|&&b| b != 0).count(), 1);
        assert!(chunks[3].payload.is_empty());
    }

    #[test]
    fn test_tile_out_of_grid() {
        let mut map = WorldMap::new("broken");
        map.tiles.push(MapTile { x: 64, y: 0, ..Default::default() });
        assert!(encode(&map).is_err());
    }
}
