//! Distant-terrain heightmap (`.wdl`).
//!
//! MAOF is a fixed 64x64 table of file offsets. Each populated tile gets a
//! MARE chunk after it, and its MAOF entry is patched to point at that
//! chunk's tag once every chunk position is known.

use tracing::debug;

use super::wdt::{tile_index, TILE_COUNT};
use super::{ContainerKind, MAP_VERSION};
use crate::assembler::{ContainerBuilder, Fixup};
use crate::format::tags;
use crate::model::WorldMap;
use crate::util::{Error, Result};

/// Heights per MARE chunk: 17x17 outer plus 16x16 inner grid.
pub const MARE_HEIGHTS: usize = 17 * 17 + 16 * 16;

/// Size of the MAOF payload.
pub const MAOF_SIZE: usize = TILE_COUNT * 4;

/// Encode the WDL of `map`.
pub fn encode(map: &WorldMap) -> Result<Vec<u8>> {
    let mut builder = ContainerBuilder::new(ContainerKind::Wdl);
    builder.push_chunk(tags::MVER, MAP_VERSION.to_le_bytes().to_vec())?;
    builder.push_chunk(tags::MWMO, Vec::new())?;
    builder.push_chunk(tags::MWID, Vec::new())?;
    builder.push_chunk(tags::MODF, Vec::new())?;
    let maof = builder.push_chunk(tags::MAOF, vec![0; MAOF_SIZE])?;

    let mut seen = vec![false; TILE_COUNT];
    for tile in &map.heightmaps {
        let index = tile_index(tile.x, tile.y)?;
        if std::mem::replace(&mut seen[index], true) {
            return Err(Error::invalid(format!("duplicate heightmap tile ({}, {})", tile.x, tile.y)));
        }
        if tile.heights.len() != MARE_HEIGHTS {
            return Err(Error::invalid(format!(
                "heightmap tile ({}, {}) has {} heights, expected {}",
                tile.x,
                tile.y,
                tile.heights.len(),
                MARE_HEIGHTS
            )));
        }
        let payload: Vec<u8> = tile.heights.iter().flat_map(|h| h.to_le_bytes()).collect();
        let mare = builder.push_chunk(tags::MARE, payload)?;
        builder.add_fixup(Fixup::file_offset(maof, index * 4, mare))?;
    }

    builder.assemble()?;
    debug!(map = %map.name, tiles = map.heightmaps.len(), "encoded wdl");
    builder.into_bytes()
}
