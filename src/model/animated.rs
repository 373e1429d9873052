//! Animated model: one M2 file plus one skin profile.

use serde::{Deserialize, Serialize};

use crate::format::{Interpolation, TrackSequences};
use crate::geometry::{CollisionMesh, MeshData};
use crate::util::{BBox3f, CompressedQuat, Fixed16, Quat, Vec3};

/// An animated model with its skeleton, sequences and texturing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimatedModel {
    /// Short name, used for the output directory and file names.
    pub name: String,
    /// Global model flags.
    pub flags: u32,
    pub mesh: MeshData,
    /// Explicit collision geometry. The render mesh is used when absent.
    pub collision: Option<CollisionMesh>,
    /// Four bone weights per vertex. Missing entries weigh fully on bone 0.
    pub bone_weights: Vec<[u8; 4]>,
    /// Four bone indices per vertex. Missing entries are all zero.
    pub bone_indices: Vec<[u8; 4]>,
    pub bones: Vec<Bone>,
    pub sequences: Vec<AnimationSequence>,
    /// Durations of the global loops referenced by track global sequence ids.
    pub global_loops: Vec<u32>,
    pub textures: Vec<ModelTexture>,
    pub materials: Vec<ModelMaterial>,
    pub colors: Vec<ModelColor>,
    /// Texture weight tracks, referenced by [`ModelMaterial::transparency`].
    pub transparencies: Vec<TrackSequences<Fixed16>>,
    pub texture_transforms: Vec<TextureTransform>,
    pub attachments: Vec<Attachment>,
}

impl AnimatedModel {
    /// Create an empty model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Bone weights of vertex `i`.
    #[inline]
    pub fn weights(&self, i: usize) -> [u8; 4] {
        self.bone_weights.get(i).copied().unwrap_or([255, 0, 0, 0])
    }

    /// Bone indices of vertex `i`.
    #[inline]
    pub fn indices(&self, i: usize) -> [u8; 4] {
        self.bone_indices.get(i).copied().unwrap_or([0; 4])
    }

    /// Rejected edits of every track, labelled by track.
    pub fn rejected_track_edits(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut collect = |label: String, rejected: &[String]| {
            for message in rejected {
                out.push((label.clone(), message.clone()));
            }
        };
        for (i, bone) in self.bones.iter().enumerate() {
            collect(format!("bone[{}].translation", i), bone.translation.rejected());
            collect(format!("bone[{}].rotation", i), bone.rotation.rejected());
            collect(format!("bone[{}].scale", i), bone.scale.rejected());
        }
        for (i, color) in self.colors.iter().enumerate() {
            collect(format!("color[{}].color", i), color.color.rejected());
            collect(format!("color[{}].alpha", i), color.alpha.rejected());
        }
        for (i, track) in self.transparencies.iter().enumerate() {
            collect(format!("transparency[{}]", i), track.rejected());
        }
        for (i, t) in self.texture_transforms.iter().enumerate() {
            collect(format!("texture_transform[{}].translation", i), t.translation.rejected());
            collect(format!("texture_transform[{}].rotation", i), t.rotation.rejected());
            collect(format!("texture_transform[{}].scale", i), t.scale.rejected());
        }
        out
    }
}

/// Skeleton bone with its three transform tracks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bone {
    /// Key bone id, or -1 for none.
    pub key_bone_id: i32,
    pub flags: u32,
    /// Parent bone index, or -1 for a root.
    pub parent: i16,
    pub submesh: u16,
    pub name_crc: u32,
    pub pivot: Vec3,
    pub translation: TrackSequences<Vec3>,
    pub rotation: TrackSequences<CompressedQuat>,
    pub scale: TrackSequences<Vec3>,
}

impl Default for Bone {
    fn default() -> Self {
        Self {
            key_bone_id: -1,
            flags: 0,
            parent: -1,
            submesh: 0,
            name_crc: 0,
            pivot: Vec3::ZERO,
            translation: TrackSequences::new(Interpolation::Linear),
            rotation: TrackSequences::new(Interpolation::Linear),
            scale: TrackSequences::new(Interpolation::Linear),
        }
    }
}

/// Animation clip record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationSequence {
    /// Animation id.
    pub id: u16,
    pub variation: u16,
    pub duration: u32,
    pub move_speed: f32,
    pub flags: u32,
    pub frequency: i16,
    pub replay_min: u32,
    pub replay_max: u32,
    pub blend_time: u32,
    /// Bounds during the clip. The model bounds are used when absent.
    pub bounds: Option<BBox3f>,
    /// Next variation, or -1.
    pub next: i16,
    pub alias: u16,
}

impl Default for AnimationSequence {
    fn default() -> Self {
        Self {
            id: 0,
            variation: 0,
            duration: 10000,
            move_speed: 0.0,
            flags: 0x20,
            frequency: 32767,
            replay_min: 0,
            replay_max: 0,
            blend_time: 150,
            bounds: None,
            next: -1,
            alias: 0,
        }
    }
}

/// Texture slot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTexture {
    /// File name stored in the model, without the trailing NUL.
    pub name: String,
    /// Texture type, 0 for a hardcoded file name.
    pub kind: u32,
    pub flags: u32,
}

impl ModelTexture {
    /// Hardcoded texture with the given file name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Render material. Each material becomes one submesh and one texture unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelMaterial {
    /// Index into [`AnimatedModel::textures`].
    pub texture: u16,
    pub flags: u16,
    pub blend_mode: u16,
    /// Material layer, capped when encoded.
    pub layer: u16,
    /// Index into [`AnimatedModel::transparencies`].
    pub transparency: u16,
    /// Index into [`AnimatedModel::texture_transforms`].
    pub texture_transform: Option<u16>,
}

/// Color and alpha tracks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelColor {
    pub color: TrackSequences<Vec3>,
    pub alpha: TrackSequences<Fixed16>,
}

impl Default for ModelColor {
    fn default() -> Self {
        Self::constant(Vec3::ONE, 1.0)
    }
}

impl ModelColor {
    /// Single-key color with the given RGB and opacity.
    pub fn constant(rgb: Vec3, alpha: f32) -> Self {
        Self {
            color: TrackSequences::constant(rgb),
            alpha: TrackSequences::constant(Fixed16::from(alpha)),
        }
    }
}

/// Texture coordinate animation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureTransform {
    pub translation: TrackSequences<Vec3>,
    pub rotation: TrackSequences<Quat>,
    pub scale: TrackSequences<Vec3>,
}

/// Attachment point.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub id: u32,
    pub bone: u32,
    pub position: Vec3,
}
