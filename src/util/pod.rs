//! Fixed-width element types and the [`Encodable`] capability.
//!
//! Every value stored inside a relocatable array or a track sequence has a
//! fixed on-disk width. Implementors report that width and serialize
//! themselves little-endian into any writer.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use super::math::{write_vec3, BBox3f, Quat, Vec2, Vec3};

/// A value with a fixed binary width that can be written little-endian.
pub trait Encodable {
    /// Size in bytes of one encoded element.
    const BYTE_WIDTH: usize;

    /// Serialize this value.
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()>;
}

macro_rules! impl_encodable_num {
    ($ty:ty, $write:ident) => {
        impl Encodable for $ty {
            const BYTE_WIDTH: usize = std::mem::size_of::<$ty>();

            #[inline]
            fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
                w.$write::<LittleEndian>(*self)
            }
        }
    };
}

impl_encodable_num!(u16, write_u16);
impl_encodable_num!(i16, write_i16);
impl_encodable_num!(u32, write_u32);
impl_encodable_num!(i32, write_i32);
impl_encodable_num!(f32, write_f32);

impl Encodable for u8 {
    const BYTE_WIDTH: usize = 1;

    #[inline]
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(*self)
    }
}

impl Encodable for [u8; 4] {
    const BYTE_WIDTH: usize = 4;

    #[inline]
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(self)
    }
}

impl Encodable for Vec2 {
    const BYTE_WIDTH: usize = 8;

    #[inline]
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_f32::<LittleEndian>(self.x)?;
        w.write_f32::<LittleEndian>(self.y)
    }
}

impl Encodable for Vec3 {
    const BYTE_WIDTH: usize = 12;

    #[inline]
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_vec3(w, *self)
    }
}

impl Encodable for Quat {
    const BYTE_WIDTH: usize = 16;

    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for c in [self.x, self.y, self.z, self.w] {
            w.write_f32::<LittleEndian>(c)?;
        }
        Ok(())
    }
}

impl Encodable for BBox3f {
    const BYTE_WIDTH: usize = 24;

    #[inline]
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.write_high_res(w)
    }
}

/// Color stored in blue, green, red, alpha byte order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Bgra {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub a: u8,
}

impl Bgra {
    /// Create a color from RGBA components.
    #[inline]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { b, g, r, a }
    }

    /// Opaque white.
    pub const WHITE: Self = Self::rgba(255, 255, 255, 255);
}

impl Encodable for Bgra {
    const BYTE_WIDTH: usize = 4;

    #[inline]
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(bytemuck::bytes_of(self))
    }
}

/// Triangle referencing three vertices of the same mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriangleFace {
    pub a: u32,
    pub b: u32,
    pub c: u32,
}

impl TriangleFace {
    /// Create a face from three vertex indices.
    #[inline]
    pub const fn new(a: u32, b: u32, c: u32) -> Self {
        Self { a, b, c }
    }

    /// The three indices in winding order.
    #[inline]
    pub const fn indices(&self) -> [u32; 3] {
        [self.a, self.b, self.c]
    }

    /// Smallest referenced vertex index.
    #[inline]
    pub fn min_index(&self) -> u32 {
        self.a.min(self.b).min(self.c)
    }

    /// Largest referenced vertex index.
    #[inline]
    pub fn max_index(&self) -> u32 {
        self.a.max(self.b).max(self.c)
    }

    /// Same face with every index shifted by `by`.
    #[inline]
    pub fn offset(&self, by: u32) -> Self {
        Self::new(self.a + by, self.b + by, self.c + by)
    }
}

impl Encodable for TriangleFace {
    const BYTE_WIDTH: usize = 6;

    /// Indices are stored as u16; meshes are validated against that limit first.
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for i in self.indices() {
            w.write_u16::<LittleEndian>(i as u16)?;
        }
        Ok(())
    }
}

/// Signed fixed-point value in `[-1, 1]` scaled by 32767.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct Fixed16(pub i16);

impl From<f32> for Fixed16 {
    fn from(value: f32) -> Self {
        Self((value.clamp(-1.0, 1.0) * 32767.0).round() as i16)
    }
}

impl From<Fixed16> for f32 {
    fn from(value: Fixed16) -> Self {
        value.0 as f32 / 32767.0
    }
}

impl Encodable for Fixed16 {
    const BYTE_WIDTH: usize = 2;

    #[inline]
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i16::<LittleEndian>(self.0)
    }
}

/// Rotation packed into four 16-bit components.
///
/// Each component maps `[-1, 1]` onto `[0, 65534]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Quat", into = "Quat")]
pub struct CompressedQuat(pub [u16; 4]);

impl CompressedQuat {
    #[inline]
    fn pack(value: f32) -> u16 {
        ((value.clamp(-1.0, 1.0) + 1.0) * 32767.0).round() as u16
    }

    #[inline]
    fn unpack(value: u16) -> f32 {
        value as f32 / 32767.0 - 1.0
    }
}

impl Default for CompressedQuat {
    fn default() -> Self {
        Quat::IDENTITY.into()
    }
}

impl From<Quat> for CompressedQuat {
    fn from(q: Quat) -> Self {
        Self([q.x, q.y, q.z, q.w].map(Self::pack))
    }
}

impl From<CompressedQuat> for Quat {
    fn from(q: CompressedQuat) -> Self {
        let [x, y, z, w] = q.0.map(CompressedQuat::unpack);
        Quat::from_xyzw(x, y, z, w)
    }
}

impl Encodable for CompressedQuat {
    const BYTE_WIDTH: usize = 8;

    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for c in self.0 {
            w.write_u16::<LittleEndian>(c)?;
        }
        Ok(())
    }
}

/// Encode a slice of elements back to back.
pub fn encode_all<T: Encodable, W: Write>(items: &[T], w: &mut W) -> io::Result<()> {
    for item in items {
        item.encode(w)?;
    }
    Ok(())
}
