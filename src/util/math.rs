//! Math type re-exports and bounding box helpers.
//!
//! This module re-exports the `glam` types used by the encoders and
//! provides the axis-aligned bounding box written by most container records.

pub use glam::{Quat, Vec2, Vec3};

use byteorder::{LittleEndian, WriteBytesExt};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};

/// 3D bounding box with single precision.
#[derive(Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct BBox3f {
    pub min: Vec3,
    pub max: Vec3,
}

impl BBox3f {
    /// Empty bounding box (inverted, will expand on first point).
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Degenerate box at the origin, written for objects with no geometry.
    pub const ZERO: Self = Self {
        min: Vec3::ZERO,
        max: Vec3::ZERO,
    };

    /// Create a new bounding box from min and max points.
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point, or [`BBox3f::ZERO`] for none.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut bbox = Self::EMPTY;
        for p in points {
            bbox.expand_by_point(*p);
        }
        if bbox.is_empty() {
            Self::ZERO
        } else {
            bbox
        }
    }

    /// Check if this box is empty (has no volume).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this box to include a point.
    #[inline]
    pub fn expand_by_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Expand this box to include another box.
    #[inline]
    pub fn expand_by_box(&mut self, other: &Self) {
        if !other.is_empty() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    /// Get the center of the box.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the size (extents) of the box.
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Distance from the center to the furthest corner.
    #[inline]
    pub fn radius(&self) -> f32 {
        self.max.distance(self.center())
    }

    /// Write min then max as six f32 values.
    pub fn write_high_res<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_vec3(w, self.min)?;
        write_vec3(w, self.max)
    }

    /// Write min then max as six i16 values rounded half away from zero.
    ///
    /// Used by WMO render batches; values are clamped to the i16 range.
    pub fn write_low_res<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for v in [self.min, self.max] {
            for c in [v.x, v.y, v.z] {
                let rounded = c.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                w.write_i16::<LittleEndian>(rounded)?;
            }
        }
        Ok(())
    }

    /// Write min then max in Y, Z, X component order.
    ///
    /// Map object placement records store extents in world axis order.
    pub fn write_placement<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for v in [self.min, self.max] {
            write_vec3(w, Vec3::new(v.y, v.z, v.x))?;
        }
        Ok(())
    }
}

/// Write a vector as three little-endian f32 values.
#[inline]
pub fn write_vec3<W: Write>(w: &mut W, v: Vec3) -> io::Result<()> {
    w.write_f32::<LittleEndian>(v.x)?;
    w.write_f32::<LittleEndian>(v.y)?;
    w.write_f32::<LittleEndian>(v.z)
}

impl Default for BBox3f {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for BBox3f {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BBox3f({:?} - {:?})", self.min, self.max)
    }
}
