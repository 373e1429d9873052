//! Map model: one WDT, one WDL and one ADT per [`MapTile`].

use serde::{Deserialize, Serialize};

use crate::util::{BBox3f, Vec3};

/// Number of tiles along each map axis.
pub const MAP_TILES: u32 = 64;

/// A map and the tiles it streams.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldMap {
    /// Short name, used for the output directory and file names.
    pub name: String,
    /// Map-wide static object. Maps built around one object carry no terrain.
    pub global_object: Option<ObjectPlacement>,
    pub tiles: Vec<MapTile>,
    /// Low-resolution heights for the distant-terrain file.
    pub heightmaps: Vec<HeightmapTile>,
}

impl WorldMap {
    /// Create an empty map.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Placement of a static object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectPlacement {
    /// Path of the object's root file.
    pub path: String,
    pub unique_id: i32,
    pub position: Vec3,
    pub rotation: Vec3,
    pub bounds: BBox3f,
    pub flags: u16,
    pub doodad_set: u16,
    pub name_set: u16,
}

impl Default for ObjectPlacement {
    fn default() -> Self {
        Self {
            path: String::new(),
            unique_id: -1,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            bounds: BBox3f::ZERO,
            flags: 0,
            doodad_set: 0,
            name_set: 0,
        }
    }
}

/// Placement of an animated model on a tile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoodadPlacement {
    /// Path of the model file.
    pub path: String,
    pub unique_id: u32,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: f32,
    pub flags: u16,
}

impl Default for DoodadPlacement {
    fn default() -> Self {
        Self {
            path: String::new(),
            unique_id: 0,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: 1.0,
            flags: 0,
        }
    }
}

/// One terrain tile.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapTile {
    pub x: u32,
    pub y: u32,
    pub area_id: u32,
    /// Height of the flat terrain.
    pub base_height: f32,
    /// Per-chunk heights, 256 chunks of 145 values. Flat terrain when empty.
    pub heights: Vec<Vec<f32>>,
    pub textures: Vec<String>,
    pub doodads: Vec<DoodadPlacement>,
    pub objects: Vec<ObjectPlacement>,
}

/// Distant-terrain heights of one tile.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightmapTile {
    pub x: u32,
    pub y: u32,
    /// 17x17 outer grid followed by the 16x16 inner grid.
    pub heights: Vec<i16>,
}
