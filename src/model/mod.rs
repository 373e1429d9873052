//! In-memory models handed to the encoders.
//!
//! These are the hand-off surface from the upstream loader. Every type is
//! serde-deserializable so a loader can emit JSON and the CLI can replay it.
//!
//! - [`static_object`] - Static objects (WMO root plus groups)
//! - [`animated`] - Animated models (M2 plus skin profile)
//! - [`world`] - Maps (WDT, WDL and ADT tiles)

pub mod static_object;
pub mod animated;
pub mod world;

pub use static_object::{DoodadInstance, Fog, ObjectGroup, ObjectLight, StaticMaterial, StaticObject};
pub use animated::{
    AnimatedModel, AnimationSequence, Attachment, Bone, ModelColor, ModelMaterial, ModelTexture, TextureTransform,
};
pub use world::{DoodadPlacement, HeightmapTile, MapTile, ObjectPlacement, WorldMap, MAP_TILES};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::util::Result;

/// One exportable object of any kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Asset {
    StaticObject(StaticObject),
    AnimatedModel(AnimatedModel),
    WorldMap(WorldMap),
}

impl Asset {
    /// Short name the asset is exported under.
    pub fn name(&self) -> &str {
        match self {
            Self::StaticObject(o) => &o.name,
            Self::AnimatedModel(m) => &m.name,
            Self::WorldMap(w) => &w.name,
        }
    }

    /// Kind label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StaticObject(_) => "static_object",
            Self::AnimatedModel(_) => "animated_model",
            Self::WorldMap(_) => "world_map",
        }
    }
}

/// Read a JSON document into any model type.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let file = File::open(path.as_ref())?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Read a JSON file holding either one asset or a list of assets.
pub fn load_assets(path: impl AsRef<Path>) -> Result<Vec<Asset>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Asset>),
        One(Box<Asset>),
    }

    Ok(match load_json::<OneOrMany>(path)? {
        OneOrMany::Many(v) => v,
        OneOrMany::One(a) => vec![*a],
    })
}
