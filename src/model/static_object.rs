//! Static object model: one WMO root plus one group file per [`ObjectGroup`].

use serde::{Deserialize, Serialize};

use crate::geometry::{CollisionMesh, MeshData};
use crate::util::{BBox3f, Bgra, Quat, Vec3};

/// A static object and everything its root file references.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticObject {
    /// Short name, used for the output directory and file names.
    pub name: String,
    /// Texture paths, referenced by [`StaticMaterial::texture`].
    pub textures: Vec<String>,
    pub materials: Vec<StaticMaterial>,
    pub groups: Vec<ObjectGroup>,
    pub doodads: Vec<DoodadInstance>,
    pub lights: Vec<ObjectLight>,
    pub fogs: Vec<Fog>,
    pub skybox: Option<String>,
    pub ambient: Option<Bgra>,
}

impl StaticObject {
    /// Create an empty object.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Bounds of every group.
    pub fn bounds(&self) -> BBox3f {
        let mut bbox = BBox3f::EMPTY;
        for group in &self.groups {
            bbox.expand_by_box(&group.mesh.bounds());
        }
        if bbox.is_empty() {
            BBox3f::ZERO
        } else {
            bbox
        }
    }
}

/// One group file of a static object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectGroup {
    pub name: String,
    pub mesh: MeshData,
    /// Explicit collision geometry. The render mesh is used when absent.
    pub collision: Option<CollisionMesh>,
    pub indoor: bool,
}

/// Root material record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticMaterial {
    /// Index into [`StaticObject::textures`].
    pub texture: Option<u32>,
    pub flags: u32,
    pub shader: u32,
    pub blend_mode: u32,
    pub emissive: Bgra,
    pub diffuse: Bgra,
    pub ground_type: u32,
}

impl Default for StaticMaterial {
    fn default() -> Self {
        Self {
            texture: None,
            flags: 0,
            shader: 0,
            blend_mode: 0,
            emissive: Bgra::rgba(0, 0, 0, 255),
            diffuse: Bgra::rgba(149, 149, 149, 255),
            ground_type: 6,
        }
    }
}

impl StaticMaterial {
    /// Opaque material using texture `index`.
    pub fn textured(index: u32) -> Self {
        Self {
            texture: Some(index),
            ..Self::default()
        }
    }
}

/// Doodad placed inside the object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoodadInstance {
    /// Model path, stored in the doodad name table.
    pub model: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
    pub color: Bgra,
    pub flags: u8,
}

impl Default for DoodadInstance {
    fn default() -> Self {
        Self {
            model: String::new(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
            color: Bgra::WHITE,
            flags: 0x1,
        }
    }
}

/// Omni light.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectLight {
    pub position: Vec3,
    pub color: Bgra,
    pub intensity: f32,
    pub attenuation_start: f32,
    pub attenuation_end: f32,
}

impl Default for ObjectLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Bgra::WHITE,
            intensity: 1.0,
            attenuation_start: 3.305556,
            attenuation_end: 11.19444,
        }
    }
}

/// Fog volume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fog {
    pub infinite_radius: bool,
    pub position: Vec3,
    pub near_radius: f32,
    pub far_radius: f32,
    pub end: f32,
    pub start_scalar: f32,
    pub color: Bgra,
    pub underwater_end: f32,
    pub underwater_start_scalar: f32,
    pub underwater_color: Bgra,
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            infinite_radius: false,
            position: Vec3::ZERO,
            near_radius: 0.0,
            far_radius: 0.0,
            end: 444.4445,
            start_scalar: 0.25,
            color: Bgra::WHITE,
            underwater_end: 222.2222,
            underwater_start_scalar: -0.5,
            underwater_color: Bgra::WHITE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::TriangleFace;

    #[test]
    fn test_defaults_from_json() {
        let obj: StaticObject = serde_json::from_str(
            r#"{"name":"crate","textures":["wall01"],"materials":[{"texture":0}],"doodads":[{"model":"barrel.m2"}]}"#,
        )
        .unwrap();
        assert_eq!(obj.materials[0], StaticMaterial::textured(0));
        assert_eq!(obj.materials[0].ground_type, 6);
        assert_eq!(obj.doodads[0].scale, 1.0);
        assert_eq!(obj.doodads[0].rotation, Quat::IDENTITY);
        assert!(obj.groups.is_empty());
    }

    #[test]
    fn test_bounds_cover_groups() {
        let mut obj = StaticObject::new("two");
        for offset in [0.0, 5.0] {
            obj.groups.push(ObjectGroup {
                mesh: MeshData::from_faces(
                    vec![Vec3::splat(offset), Vec3::splat(offset + 1.0), Vec3::ZERO],
                    vec![TriangleFace::new(0, 1, 2)],
                    0,
                ),
                ..ObjectGroup::default()
            });
        }
        let bounds = obj.bounds();
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::splat(6.0));
        assert_eq!(StaticObject::new("empty").bounds(), BBox3f::ZERO);
    }
}
