//! Terrain tile (`<map>_<x>_<y>.adt`).
//!
//! A tile is split into 16x16 MCNK chunks. MHDR offsets are relative to
//! the MHDR payload, MCIN offsets are file-absolute; both point at chunk
//! tags and are filled in by assembler fixups.

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use super::wdt::{tile_index, write_object_placement};
use super::{ContainerKind, MAP_VERSION};
use crate::assembler::{ContainerBuilder, Fixup};
use crate::format::{tags, ChunkFramer, StringTable, CHUNK_HEADER_SIZE};
use crate::model::{DoodadPlacement, MapTile};
use crate::registry::ObjectProperties;
use crate::util::{to_u32, write_vec3, Error, Result, Vec3};

/// Chunks per tile side.
pub const CHUNKS_PER_SIDE: u32 = 16;

/// Chunks per tile.
pub const CHUNK_COUNT: usize = (CHUNKS_PER_SIDE * CHUNKS_PER_SIDE) as usize;

/// Heights per chunk: 9x9 outer plus 8x8 inner vertices.
pub const CHUNK_HEIGHTS: usize = 9 * 9 + 8 * 8;

/// Tile edge length in world units.
pub const TILE_SIZE: f32 = 1600.0 / 3.0;

/// Chunk edge length in world units.
pub const CHUNK_SIZE: f32 = TILE_SIZE / CHUNKS_PER_SIDE as f32;

/// Size of the MCNK header that precedes its subchunks.
pub const MCNK_HEADER_SIZE: usize = 128;

/// MDDF scale that means 1.0.
const DOODAD_SCALE_ONE: f32 = 1024.0;

const MHDR_SIZE: usize = 64;
const MCNR_PADDING: usize = 13;
const MCLY_ENTRY_SIZE: usize = 16;

/// Chunk containing placement position `p` on tile `tile`, as (column, row).
fn chunk_of(tile: &MapTile, p: Vec3) -> (u32, u32) {
    let local = |v: f32, t: u32| {
        let c = ((v - t as f32 * TILE_SIZE) / CHUNK_SIZE).floor();
        c.clamp(0.0, (CHUNKS_PER_SIDE - 1) as f32) as u32
    };
    (local(p.x, tile.x), local(p.z, tile.y))
}

fn write_doodad_placement(out: &mut Vec<u8>, doodad: &DoodadPlacement, name_id: u32) -> Result<()> {
    out.write_u32::<LittleEndian>(name_id)?;
    out.write_u32::<LittleEndian>(doodad.unique_id)?;
    write_vec3(out, doodad.position)?;
    write_vec3(out, doodad.rotation)?;
    let scale = (doodad.scale * DOODAD_SCALE_ONE).round().clamp(0.0, u16::MAX as f32) as u16;
    out.write_u16::<LittleEndian>(scale)?;
    out.write_u16::<LittleEndian>(doodad.flags)?;
    Ok(())
}

fn string_chunk<'a>(names: impl Iterator<Item = &'a str>) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut table = StringTable::new();
    let mut ids = Vec::new();
    for name in names {
        ids.write_u32::<LittleEndian>(table.insert(name)?)?;
    }
    Ok((table.into_bytes(), ids))
}

struct ChunkContent<'a> {
    tile: &'a MapTile,
    col: u32,
    row: u32,
    area_id: u32,
    doodad_refs: Vec<u32>,
    object_refs: Vec<u32>,
}

impl ChunkContent<'_> {
    fn heights(&self) -> Result<Vec<f32>> {
        let index = (self.row * CHUNKS_PER_SIDE + self.col) as usize;
        match self.tile.heights.get(index) {
            None => Ok(vec![0.0; CHUNK_HEIGHTS]),
            Some(h) if h.len() == CHUNK_HEIGHTS => Ok(h.clone()),
            Some(h) => Err(Error::invalid(format!(
                "chunk {} of tile ({}, {}) has {} heights, expected {}",
                index,
                self.tile.x,
                self.tile.y,
                h.len(),
                CHUNK_HEIGHTS
            ))),
        }
    }

    /// World position of the chunk's corner.
    fn position(&self) -> Vec3 {
        let origin = 32.0 * TILE_SIZE;
        Vec3::new(
            origin - self.tile.y as f32 * TILE_SIZE - self.row as f32 * CHUNK_SIZE,
            origin - self.tile.x as f32 * TILE_SIZE - self.col as f32 * CHUNK_SIZE,
            self.tile.base_height,
        )
    }

    fn encode(&self, framer: &ChunkFramer) -> Result<Vec<u8>> {
        let mut mcvt = Vec::with_capacity(CHUNK_HEIGHTS * 4);
        for h in self.heights()? {
            mcvt.write_f32::<LittleEndian>(h)?;
        }
        let mut mcnr = Vec::with_capacity(CHUNK_HEIGHTS * 3 + MCNR_PADDING);
        for _ in 0..CHUNK_HEIGHTS {
            mcnr.extend_from_slice(&[0, 0, 127]);
        }
        mcnr.resize(mcnr.len() + MCNR_PADDING, 0);

        let layers = u32::from(!self.tile.textures.is_empty());
        let mut mcly = Vec::with_capacity(MCLY_ENTRY_SIZE);
        if layers > 0 {
            // base layer: texture 0, no alpha map
            mcly.resize(MCLY_ENTRY_SIZE, 0);
        }

        let mut mcrf = Vec::new();
        for r in self.doodad_refs.iter().chain(&self.object_refs) {
            mcrf.write_u32::<LittleEndian>(*r)?;
        }

        let header_end = CHUNK_HEADER_SIZE + MCNK_HEADER_SIZE;
        let ofs_mcvt = header_end;
        let ofs_mcnr = ofs_mcvt + CHUNK_HEADER_SIZE + mcvt.len();
        let ofs_mcly = ofs_mcnr + CHUNK_HEADER_SIZE + mcnr.len();
        let ofs_mcrf = ofs_mcly + CHUNK_HEADER_SIZE + mcly.len();

        let mut out = Vec::with_capacity(ofs_mcrf + CHUNK_HEADER_SIZE + mcrf.len());
        out.write_u32::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(self.col)?;
        out.write_u32::<LittleEndian>(self.row)?;
        out.write_u32::<LittleEndian>(layers)?;
        out.write_u32::<LittleEndian>(to_u32(self.doodad_refs.len())?)?;
        for ofs in [ofs_mcvt, ofs_mcnr, ofs_mcly, ofs_mcrf] {
            out.write_u32::<LittleEndian>(to_u32(ofs)?)?;
        }
        // MCAL and MCSH offsets and sizes
        out.resize(out.len() + 16, 0);
        out.write_u32::<LittleEndian>(self.area_id)?;
        out.write_u32::<LittleEndian>(to_u32(self.object_refs.len())?)?;
        // holes, low-res texture map, no-effect doodads, MCSE
        out.resize(out.len() + 4 + 16 + 8 + 8, 0);
        out.write_u32::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(8)?;
        write_vec3(&mut out, self.position())?;
        // MCCV, MCLV, unused
        out.resize(out.len() + 12, 0);
        debug_assert_eq!(out.len(), MCNK_HEADER_SIZE);

        framer.write_header(&mut out, tags::MCVT, mcvt.len())?;
        out.extend_from_slice(&mcvt);
        framer.write_header(&mut out, tags::MCNR, mcnr.len())?;
        out.extend_from_slice(&mcnr);
        framer.write_header(&mut out, tags::MCLY, mcly.len())?;
        out.extend_from_slice(&mcly);
        framer.write_header(&mut out, tags::MCRF, mcrf.len())?;
        out.extend_from_slice(&mcrf);
        Ok(out)
    }
}

/// Encode one terrain tile.
///
/// `props` overrides the tile's area id.
pub fn encode(tile: &MapTile, props: Option<&ObjectProperties>) -> Result<Vec<u8>> {
    tile_index(tile.x, tile.y)?;
    if tile.heights.len() > CHUNK_COUNT {
        return Err(Error::invalid(format!("tile has {} height chunks", tile.heights.len())));
    }
    let area_id = props.and_then(|p| p.area_id).unwrap_or(tile.area_id);
    let mut builder = ContainerBuilder::new(ContainerKind::Adt);
    let framer = ChunkFramer::new(ContainerKind::Adt.tag_order());

    builder.push_chunk(tags::MVER, MAP_VERSION.to_le_bytes().to_vec())?;
    let mhdr = builder.push_chunk(tags::MHDR, vec![0; MHDR_SIZE])?;
    let mcin = builder.push_chunk(tags::MCIN, vec![0; CHUNK_COUNT * 16])?;

    let (mtex, _) = string_chunk(tile.textures.iter().map(String::as_str))?;
    let mtex = builder.push_chunk(tags::MTEX, mtex)?;
    let (mmdx, mmid) = string_chunk(tile.doodads.iter().map(|d| d.path.as_str()))?;
    let mmdx = builder.push_chunk(tags::MMDX, mmdx)?;
    let mmid = builder.push_chunk(tags::MMID, mmid)?;
    let (mwmo, mwid) = string_chunk(tile.objects.iter().map(|o| o.path.as_str()))?;
    let mwmo = builder.push_chunk(tags::MWMO, mwmo)?;
    let mwid = builder.push_chunk(tags::MWID, mwid)?;

    let mut mddf = Vec::with_capacity(tile.doodads.len() * 36);
    for (i, doodad) in tile.doodads.iter().enumerate() {
        write_doodad_placement(&mut mddf, doodad, to_u32(i)?)?;
    }
    let mddf = builder.push_chunk(tags::MDDF, mddf)?;
    let mut modf = Vec::with_capacity(tile.objects.len() * 64);
    for (i, object) in tile.objects.iter().enumerate() {
        write_object_placement(&mut modf, object, to_u32(i)?)?;
    }
    let modf = builder.push_chunk(tags::MODF, modf)?;

    for (slot, target) in [mcin, mtex, mmdx, mmid, mwmo, mwid, mddf, modf].into_iter().enumerate() {
        builder.add_fixup(Fixup::relative_offset(mhdr, 4 + slot * 4, target, mhdr))?;
    }

    let mut contents: Vec<ChunkContent<'_>> = (0..CHUNK_COUNT as u32)
        .map(|i| ChunkContent {
            tile,
            col: i % CHUNKS_PER_SIDE,
            row: i / CHUNKS_PER_SIDE,
            area_id,
            doodad_refs: Vec::new(),
            object_refs: Vec::new(),
        })
        .collect();
    for (i, doodad) in tile.doodads.iter().enumerate() {
        let (col, row) = chunk_of(tile, doodad.position);
        contents[(row * CHUNKS_PER_SIDE + col) as usize].doodad_refs.push(to_u32(i)?);
    }
    for (i, object) in tile.objects.iter().enumerate() {
        let (col, row) = chunk_of(tile, object.position);
        contents[(row * CHUNKS_PER_SIDE + col) as usize].object_refs.push(to_u32(i)?);
    }

    for (i, content) in contents.iter().enumerate() {
        let mcnk = builder.push_chunk(tags::MCNK, content.encode(&framer)?)?;
        builder.add_fixup(Fixup::file_offset(mcin, i * 16, mcnk))?;
        builder.add_fixup(Fixup::frame_size(mcin, i * 16 + 4, mcnk))?;
    }

    builder.assemble()?;
    debug!(x = tile.x, y = tile.y, doodads = tile.doodads.len(), objects = tile.objects.len(), "encoded adt");
    builder.into_bytes()
}
