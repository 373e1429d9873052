//! Animated model (`MD20`) encoder.
//!
//! The model is one relocatable blob: a fixed header of array slots
//! followed by every data block in header order, each aligned to 16
//! bytes. Offsets are relative to the `MD20` magic, so the same bytes
//! are valid raw or wrapped in an `MD21` chunk.

use tracing::debug;

use super::skin::{build_skin_section, TextureUnit};
use super::{report, ContainerKind, EncodeOptions};
use crate::assembler::assemble;
use crate::format::{tags, ArraySlot, DeferredBuffer, Record, TrackSequences, TrackSlots, MODEL_DATA_ALIGNMENT};
use crate::geometry::{resolve_collision, MaterialRange};
use crate::model::{AnimatedModel, AnimationSequence, Attachment, Bone, ModelColor, ModelMaterial, ModelTexture, TextureTransform};
use crate::registry::ObjectProperties;
use crate::util::{BBox3f, Diagnostics, Error, Encodable, Fixed16, Result, Vec2, Vec3};

/// Model magic, stored literally.
pub const M2_MAGIC: &[u8; 4] = b"MD20";

/// Format version written to the header.
pub const M2_VERSION: u32 = 264;

/// Header size without the blend override array.
pub const M2_HEADER_SIZE: usize = 304;

/// Model flag that appends a blend override array to the header.
pub const BLEND_MODE_OVERRIDES: u32 = 0x8;

/// Size of one vertex record.
pub const VERTEX_SIZE: usize = 48;

/// Position of the blend override array, present only with [`BLEND_MODE_OVERRIDES`].
pub const BLEND_OVERRIDES_FIELD: usize = 0x130;

/// `{count, offset}` arrays of the model header, by byte position.
pub const HEADER_ARRAYS: &[(&str, usize)] = &[
    ("name", 0x08),
    ("global_loops", 0x14),
    ("sequences", 0x1C),
    ("sequence_lookup", 0x24),
    ("bones", 0x2C),
    ("key_bone_lookup", 0x34),
    ("vertices", 0x3C),
    ("colors", 0x48),
    ("textures", 0x50),
    ("texture_weights", 0x58),
    ("texture_transforms", 0x60),
    ("replaceable_lookup", 0x68),
    ("materials", 0x70),
    ("bone_lookup", 0x78),
    ("texture_lookup", 0x80),
    ("texture_mapping_lookup", 0x88),
    ("transparency_lookup", 0x90),
    ("texture_transform_lookup", 0x98),
    ("collision_indices", 0xD8),
    ("collision_vertices", 0xE0),
    ("collision_normals", 0xE8),
    ("attachments", 0xF0),
    ("attachment_lookup", 0xF8),
    ("events", 0x100),
    ("lights", 0x108),
    ("cameras", 0x110),
    ("camera_lookup", 0x118),
    ("ribbon_emitters", 0x120),
    ("particle_emitters", 0x128),
];

/// Lookup tables derived from a model, shared by the model and its skin profile.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelTables {
    /// Materials, padded so every material a face references exists.
    pub materials: Vec<ModelMaterial>,
    pub textures: Vec<ModelTexture>,
    pub sequence_lookup: Vec<i16>,
    pub key_bone_lookup: Vec<i16>,
    pub bone_lookup: Vec<u16>,
    /// One entry per material: the texture that material samples.
    pub texture_lookup: Vec<u16>,
    pub texture_mapping_lookup: Vec<i16>,
    pub texture_weights: Vec<TrackSequences<Fixed16>>,
    pub transparency_lookup: Vec<u16>,
    /// Identity over the texture transforms, followed by one `-1` entry.
    pub texture_transform_lookup: Vec<i16>,
    pub replaceable_lookup: Vec<i16>,
    pub attachment_lookup: Vec<i16>,
}

/// Largest key a lookup table accepts.
pub const MAX_LOOKUP_KEY: usize = u16::MAX as usize;

/// Record `index` under `key` unless the key already has an entry.
fn insert_first(lookup: &mut Vec<i16>, key: usize, index: usize, what: &str) -> Result<()> {
    if key > MAX_LOOKUP_KEY {
        return Err(Error::invalid(format!("{} id {} exceeds the lookup range", what, key)));
    }
    let index = i16::try_from(index)
        .map_err(|_| Error::invalid(format!("{} index {} does not fit a lookup entry", what, index)))?;
    if key >= lookup.len() {
        lookup.resize(key + 1, -1);
    }
    if lookup[key] < 0 {
        lookup[key] = index;
    }
    Ok(())
}

/// Dense lookup of length `max key + 1`: first index per key, `-1` elsewhere.
fn dense_lookup(keys: impl Iterator<Item = usize>, what: &str) -> Result<Vec<i16>> {
    let mut out = Vec::new();
    for (index, key) in keys.enumerate() {
        insert_first(&mut out, key, index, what)?;
    }
    Ok(out)
}

/// Identity lookup `0..len`.
fn identity_lookup<T: TryFrom<usize>>(len: usize, what: &str) -> Result<Vec<T>> {
    (0..len)
        .map(|i| T::try_from(i).map_err(|_| Error::invalid(format!("{} count {} exceeds the lookup range", what, len))))
        .collect()
}

impl ModelTables {
    /// Derive every lookup table of `model`.
    pub fn build(model: &AnimatedModel, opts: &EncodeOptions) -> Result<Self> {
        let mut materials = model.materials.clone();
        let needed = model.mesh.materials.iter().map(|&m| m as usize + 1).max().unwrap_or(0);
        if materials.len() < needed {
            materials.resize(needed, ModelMaterial::default());
        }

        let textures = model
            .textures
            .iter()
            .map(|t| ModelTexture {
                name: if t.kind == 0 { opts.texture_path(&t.name) } else { t.name.clone() },
                ..t.clone()
            })
            .collect();

        let sequence_lookup = dense_lookup(model.sequences.iter().map(|s| s.id as usize), "sequence")?;
        let mut key_bone_lookup = Vec::new();
        for (index, bone) in model.bones.iter().enumerate() {
            if bone.key_bone_id >= 0 {
                insert_first(&mut key_bone_lookup, bone.key_bone_id as usize, index, "key bone")?;
            }
        }

        let bone_lookup = if model.bones.is_empty() {
            vec![0]
        } else {
            identity_lookup(model.bones.len(), "bone")?
        };

        let texture_lookup = materials.iter().map(|m| m.texture).collect();

        let texture_weights = if model.transparencies.is_empty() {
            vec![TrackSequences::constant(Fixed16(i16::MAX))]
        } else {
            model.transparencies.clone()
        };
        let transparency_lookup = identity_lookup(texture_weights.len(), "transparency")?;

        let mut texture_transform_lookup: Vec<i16> = identity_lookup(model.texture_transforms.len(), "texture transform")?;
        texture_transform_lookup.push(-1);

        let mut replaceable_lookup = Vec::new();
        for (index, texture) in model.textures.iter().enumerate() {
            if texture.kind > 0 {
                insert_first(&mut replaceable_lookup, texture.kind as usize, index, "replaceable texture")?;
            }
        }

        let attachment_lookup = dense_lookup(model.attachments.iter().map(|a| a.id as usize), "attachment")?;

        Ok(Self {
            materials,
            textures,
            sequence_lookup,
            key_bone_lookup,
            bone_lookup,
            texture_lookup,
            texture_mapping_lookup: vec![0],
            texture_weights,
            transparency_lookup,
            texture_transform_lookup,
            replaceable_lookup,
            attachment_lookup,
        })
    }

    /// Texture unit drawing submesh `submesh_index` with its material.
    pub fn texture_unit(&self, submesh_index: u16, range: &MaterialRange) -> TextureUnit {
        let material = self.materials.get(range.material as usize).cloned().unwrap_or_default();
        let transform_slot = match material.texture_transform {
            Some(t) if (t as usize) + 1 < self.texture_transform_lookup.len() => t,
            _ => (self.texture_transform_lookup.len() - 1) as u16,
        };
        build_skin_section(submesh_index, range.material, range.material)
            .with_layer(material.layer)
            .with_transparency_lookup(material.transparency)
            .with_texture_transform_lookup(transform_slot)
    }

    /// Report material references that point past their tables.
    pub fn check_references(&self, diag: &mut Diagnostics, strict: bool) -> Result<()> {
        for (i, m) in self.materials.iter().enumerate() {
            if m.texture as usize >= self.textures.len() {
                report(diag, strict, "MD20", &format!("material[{}]", i), format!("texture {} does not exist", m.texture))?;
            }
            if m.transparency as usize >= self.transparency_lookup.len() {
                report(
                    diag,
                    strict,
                    "MD20",
                    &format!("material[{}]", i),
                    format!("transparency {} does not exist", m.transparency),
                )?;
            }
        }
        Ok(())
    }
}

struct SequenceRecord<'a> {
    seq: &'a AnimationSequence,
    fallback: BBox3f,
}

impl Encodable for SequenceRecord<'_> {
    const BYTE_WIDTH: usize = 64;

    fn encode<W: std::io::Write>(&self, w: &mut W) -> std::io::Result<()> {
        use byteorder::{LittleEndian, WriteBytesExt};
        let s = self.seq;
        let bounds = s.bounds.unwrap_or(self.fallback);
        w.write_u16::<LittleEndian>(s.id)?;
        w.write_u16::<LittleEndian>(s.variation)?;
        w.write_u32::<LittleEndian>(s.duration)?;
        w.write_f32::<LittleEndian>(s.move_speed)?;
        w.write_u32::<LittleEndian>(s.flags)?;
        w.write_i16::<LittleEndian>(s.frequency)?;
        w.write_u16::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(s.replay_min)?;
        w.write_u32::<LittleEndian>(s.replay_max)?;
        w.write_u32::<LittleEndian>(s.blend_time)?;
        bounds.write_high_res(w)?;
        w.write_f32::<LittleEndian>(bounds.radius())?;
        w.write_i16::<LittleEndian>(s.next)?;
        w.write_u16::<LittleEndian>(s.alias)
    }
}

struct VertexRecord {
    position: Vec3,
    weights: [u8; 4],
    indices: [u8; 4],
    normal: Vec3,
    uv: Vec2,
}

impl Encodable for VertexRecord {
    const BYTE_WIDTH: usize = VERTEX_SIZE;

    fn encode<W: std::io::Write>(&self, w: &mut W) -> std::io::Result<()> {
        self.position.encode(w)?;
        w.write_all(&self.weights)?;
        w.write_all(&self.indices)?;
        self.normal.encode(w)?;
        self.uv.encode(w)?;
        Vec2::ZERO.encode(w)
    }
}

impl Encodable for ModelMaterial {
    const BYTE_WIDTH: usize = 4;

    fn encode<W: std::io::Write>(&self, w: &mut W) -> std::io::Result<()> {
        use byteorder::{LittleEndian, WriteBytesExt};
        w.write_u16::<LittleEndian>(self.flags)?;
        w.write_u16::<LittleEndian>(self.blend_mode)
    }
}

impl Record for Bone {
    const RECORD_SIZE: usize = 88;
    type Pending = [TrackSlots; 3];

    fn write_record(&self, buf: &mut DeferredBuffer) -> Result<Self::Pending> {
        buf.put_i32(self.key_bone_id)?;
        buf.put_u32(self.flags)?;
        buf.put_i16(self.parent)?;
        buf.put_u16(self.submesh)?;
        buf.put_u32(self.name_crc)?;
        let t = self.translation.write_header(buf)?;
        let r = self.rotation.write_header(buf)?;
        let s = self.scale.write_header(buf)?;
        buf.put(&self.pivot)?;
        Ok([t, r, s])
    }

    fn write_payload(&self, pending: Self::Pending, buf: &mut DeferredBuffer, alignment: usize) -> Result<()> {
        let [t, r, s] = pending;
        self.translation.write_data(t, buf, alignment)?;
        self.rotation.write_data(r, buf, alignment)?;
        self.scale.write_data(s, buf, alignment)
    }
}

impl Record for ModelColor {
    const RECORD_SIZE: usize = 40;
    type Pending = [TrackSlots; 2];

    fn write_record(&self, buf: &mut DeferredBuffer) -> Result<Self::Pending> {
        Ok([self.color.write_header(buf)?, self.alpha.write_header(buf)?])
    }

    fn write_payload(&self, pending: Self::Pending, buf: &mut DeferredBuffer, alignment: usize) -> Result<()> {
        let [c, a] = pending;
        self.color.write_data(c, buf, alignment)?;
        self.alpha.write_data(a, buf, alignment)
    }
}

impl Record for TextureTransform {
    const RECORD_SIZE: usize = 60;
    type Pending = [TrackSlots; 3];

    fn write_record(&self, buf: &mut DeferredBuffer) -> Result<Self::Pending> {
        Ok([
            self.translation.write_header(buf)?,
            self.rotation.write_header(buf)?,
            self.scale.write_header(buf)?,
        ])
    }

    fn write_payload(&self, pending: Self::Pending, buf: &mut DeferredBuffer, alignment: usize) -> Result<()> {
        let [t, r, s] = pending;
        self.translation.write_data(t, buf, alignment)?;
        self.rotation.write_data(r, buf, alignment)?;
        self.scale.write_data(s, buf, alignment)
    }
}

impl Record for ModelTexture {
    const RECORD_SIZE: usize = 16;
    type Pending = ArraySlot;

    fn write_record(&self, buf: &mut DeferredBuffer) -> Result<ArraySlot> {
        buf.put_u32(self.kind)?;
        buf.put_u32(self.flags)?;
        Ok(ArraySlot::reserve(buf))
    }

    /// File name with its NUL; the count includes the terminator.
    fn write_payload(&self, pending: ArraySlot, buf: &mut DeferredBuffer, alignment: usize) -> Result<()> {
        pending.begin_data(buf, self.name.len() + 1, alignment)?;
        buf.put_bytes(self.name.as_bytes());
        buf.put_u8(0);
        Ok(())
    }
}

struct AttachmentRecord<'a> {
    attachment: &'a Attachment,
    visible: TrackSequences<u8>,
}

impl Record for AttachmentRecord<'_> {
    const RECORD_SIZE: usize = 40;
    type Pending = TrackSlots;

    fn write_record(&self, buf: &mut DeferredBuffer) -> Result<TrackSlots> {
        buf.put_u32(self.attachment.id)?;
        buf.put_u32(self.attachment.bone)?;
        buf.put(&self.attachment.position)?;
        self.visible.write_header(buf)
    }

    fn write_payload(&self, pending: TrackSlots, buf: &mut DeferredBuffer, alignment: usize) -> Result<()> {
        self.visible.write_data(pending, buf, alignment)
    }
}

/// Report rejected track edits: fatal in strict mode, diagnostics otherwise.
pub fn check_track_edits(model: &AnimatedModel, strict: bool, diag: &mut Diagnostics) -> Result<()> {
    for (label, message) in model.rejected_track_edits() {
        report(diag, strict, "MD20", &label, message)?;
    }
    Ok(())
}

/// Encode the `MD20` blob of `model`.
///
/// The model must have passed mesh validation.
pub fn encode(
    model: &AnimatedModel,
    tables: &ModelTables,
    props: Option<&ObjectProperties>,
) -> Result<Vec<u8>> {
    let align = MODEL_DATA_ALIGNMENT;
    let flags = props.and_then(|p| p.model_flags).unwrap_or(model.flags);
    let mesh = &model.mesh;
    let bounds = if mesh.is_empty() { BBox3f::ZERO } else { mesh.bounds() };
    let collision = resolve_collision(model.collision.as_ref(), mesh);
    let collision_bounds = if collision.is_empty() {
        BBox3f::ZERO
    } else {
        collision.bounds()
    };

    let mut buf = DeferredBuffer::with_capacity(M2_HEADER_SIZE + mesh.vertex_count() * VERTEX_SIZE);
    buf.put_bytes(M2_MAGIC);
    buf.put_u32(M2_VERSION)?;
    let name = ArraySlot::reserve(&mut buf);
    buf.put_u32(flags)?;
    let global_loops = ArraySlot::reserve(&mut buf);
    let sequences = ArraySlot::reserve(&mut buf);
    let sequence_lookup = ArraySlot::reserve(&mut buf);
    let bones = ArraySlot::reserve(&mut buf);
    let key_bone_lookup = ArraySlot::reserve(&mut buf);
    let vertices = ArraySlot::reserve(&mut buf);
    buf.put_u32(1)?;
    let colors = ArraySlot::reserve(&mut buf);
    let textures = ArraySlot::reserve(&mut buf);
    let texture_weights = ArraySlot::reserve(&mut buf);
    let texture_transforms = ArraySlot::reserve(&mut buf);
    let replaceable_lookup = ArraySlot::reserve(&mut buf);
    let materials = ArraySlot::reserve(&mut buf);
    let bone_lookup = ArraySlot::reserve(&mut buf);
    let texture_lookup = ArraySlot::reserve(&mut buf);
    let mapping_lookup = ArraySlot::reserve(&mut buf);
    let transparency_lookup = ArraySlot::reserve(&mut buf);
    let transform_lookup = ArraySlot::reserve(&mut buf);
    buf.put(&bounds)?;
    buf.put_f32(bounds.radius())?;
    buf.put(&collision_bounds)?;
    buf.put_f32(collision_bounds.radius())?;
    let collision_indices = ArraySlot::reserve(&mut buf);
    let collision_vertices = ArraySlot::reserve(&mut buf);
    let collision_normals = ArraySlot::reserve(&mut buf);
    let attachments = ArraySlot::reserve(&mut buf);
    let attachment_lookup = ArraySlot::reserve(&mut buf);
    let mut empty = Vec::with_capacity(7);
    for _ in 0..6 {
        empty.push(ArraySlot::reserve(&mut buf));
    }
    if flags & BLEND_MODE_OVERRIDES != 0 {
        empty.push(ArraySlot::reserve(&mut buf));
    }
    debug_assert_eq!(
        buf.len(),
        M2_HEADER_SIZE + if flags & BLEND_MODE_OVERRIDES != 0 { 8 } else { 0 }
    );

    name.begin_data(&mut buf, model.name.len() + 1, align)?;
    buf.put_bytes(model.name.as_bytes());
    buf.put_u8(0);

    global_loops.write_elements(&mut buf, &model.global_loops, align)?;
    let sequence_records: Vec<SequenceRecord<'_>> = model
        .sequences
        .iter()
        .map(|seq| SequenceRecord { seq, fallback: bounds })
        .collect();
    sequences.write_elements(&mut buf, &sequence_records, align)?;
    sequence_lookup.write_elements(&mut buf, &tables.sequence_lookup, align)?;
    bones.write_records(&mut buf, &model.bones, align)?;
    key_bone_lookup.write_elements(&mut buf, &tables.key_bone_lookup, align)?;

    let vertex_records: Vec<VertexRecord> = (0..mesh.vertex_count())
        .map(|i| VertexRecord {
            position: mesh.positions[i],
            weights: model.weights(i),
            indices: model.indices(i),
            normal: mesh.normal(i),
            uv: mesh.uv(i),
        })
        .collect();
    vertices.write_elements(&mut buf, &vertex_records, align)?;

    colors.write_records(&mut buf, &model.colors, align)?;
    textures.write_records(&mut buf, &tables.textures, align)?;
    texture_weights.write_records(&mut buf, &tables.texture_weights, align)?;
    texture_transforms.write_records(&mut buf, &model.texture_transforms, align)?;
    replaceable_lookup.write_elements(&mut buf, &tables.replaceable_lookup, align)?;
    materials.write_elements(&mut buf, &tables.materials, align)?;
    bone_lookup.write_elements(&mut buf, &tables.bone_lookup, align)?;
    texture_lookup.write_elements(&mut buf, &tables.texture_lookup, align)?;
    mapping_lookup.write_elements(&mut buf, &tables.texture_mapping_lookup, align)?;
    transparency_lookup.write_elements(&mut buf, &tables.transparency_lookup, align)?;
    transform_lookup.write_elements(&mut buf, &tables.texture_transform_lookup, align)?;

    let flat: Vec<u16> = collision
        .triangles
        .iter()
        .flat_map(|f| f.indices())
        .map(|i| i as u16)
        .collect();
    collision_indices.write_elements(&mut buf, &flat, align)?;
    collision_vertices.write_elements(&mut buf, &collision.positions, align)?;
    collision_normals.write_elements(&mut buf, &collision.face_normals(), align)?;

    let attachment_records: Vec<AttachmentRecord<'_>> = model
        .attachments
        .iter()
        .map(|attachment| AttachmentRecord {
            attachment,
            visible: TrackSequences::constant(1u8),
        })
        .collect();
    attachments.write_records(&mut buf, &attachment_records, align)?;
    attachment_lookup.write_elements(&mut buf, &tables.attachment_lookup, align)?;

    for slot in empty {
        slot.resolve_empty(&mut buf);
    }

    debug!(
        model = %model.name,
        vertices = mesh.vertex_count(),
        bones = model.bones.len(),
        bytes = buf.len(),
        "encoded model"
    );
    buf.finish()
}

/// Encode and optionally wrap in an `MD21` chunk.
pub fn encode_file(
    model: &AnimatedModel,
    tables: &ModelTables,
    props: Option<&ObjectProperties>,
    opts: &EncodeOptions,
) -> Result<Vec<u8>> {
    let raw = encode(model, tables, props)?;
    if opts.chunked_models {
        assemble(ContainerKind::M2Chunked, [(tags::MD21, raw)])
    } else {
        Ok(raw)
    }
}
